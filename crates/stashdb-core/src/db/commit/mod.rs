//! Commit and delete protocol.
//!
//! Commit order within one cycle:
//! 1. primary rows (one bulk hash write)
//! 2. unique pointers (one bulk key write)
//! 3. index-set unions
//! 4. stale index removals left behind by updates
//! 5. expiry of a freshly created primary table
//!
//! Steps are not atomic as a group. A failure surfaces immediately, leaves
//! earlier steps applied and leaves the buffer intact; every step is
//! idempotent, so flushing the same buffer again converges.


use crate::{
    db::{cache::ObjectCache, keyspace::KeySpace, store::StoreClient},
    error::{ErrorDetail, InternalError},
    model::RecordType,
    obs::sink::{self, MetricsEvent},
    record::Record,
    value::Value,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Allocate the next primary key from the type's counter.
pub(crate) fn allocate_id(
    client: &dyn StoreClient,
    keyspace: &KeySpace,
    record_type: &RecordType,
) -> Result<Value, InternalError> {
    let id = client.incr(&keyspace.counter())?;
    sink::record(MetricsEvent::IdAllocated {
        type_name: record_type.name(),
    });

    Ok(Value::Int(id))
}

/// Write every staged object and its index entries, then clear the buffer.
/// Returns the number of objects written.
pub(crate) fn commit(
    client: &dyn StoreClient,
    ttl: Option<Duration>,
    cache: &mut ObjectCache,
) -> Result<usize, InternalError> {
    if cache.is_empty() {
        return Ok(0);
    }
    let table = cache.keyspace().table();

    let rows = cache
        .objects()
        .iter()
        .map(|(id, record)| record.encode().map(|bytes| (id.clone(), bytes)))
        .collect::<Result<Vec<_>, _>>()?;

    let created = match ttl {
        Some(_) => !client.exists(&table)?,
        None => false,
    };
    client.hmset(&table, &rows)?;

    let pointers = cache
        .unique_index_writes()
        .iter()
        .map(|(key, id)| (key.clone(), id.as_bytes().to_vec()))
        .collect::<Vec<_>>();
    if !pointers.is_empty() {
        client.mset(&pointers)?;
    }

    let mut index_adds = 0_u64;
    for (key, ids) in cache.set_index_writes() {
        let members = ids.iter().map(|id| id.as_bytes().to_vec()).collect::<Vec<_>>();
        index_adds += client.sadd(key, &members)?;
    }

    let mut index_removes = 0_u64;
    for (key, ids) in cache.set_index_removals() {
        let members = ids.iter().map(|id| id.as_bytes().to_vec()).collect::<Vec<_>>();
        index_removes += client.srem(key, &members)?;
    }
    for (key, id) in cache.unique_index_removals() {
        // The pointer may have been claimed by another record since.
        if client.get(key)?.as_deref() == Some(id.as_bytes()) {
            index_removes += client.del(&[key.clone()])?;
        }
    }

    if let Some(ttl) = ttl.filter(|_| created) {
        client.expire(&table, ttl)?;
    }

    let written = rows.len();
    let type_name = cache.record_type().name().to_string();
    debug!(
        record_type = %type_name,
        objects = written,
        unique_writes = pointers.len(),
        index_adds,
        index_removes,
        "committed staging buffer"
    );
    sink::record(MetricsEvent::Commit {
        type_name: &type_name,
        objects: written as u64,
        unique_writes: pointers.len() as u64,
        index_adds,
        index_removes,
    });
    cache.clear();

    Ok(written)
}

/// Remove a record from the primary table, every index entry it holds and
/// its structure-backed fields.
///
/// Returns 0 if the record was not in the primary table (nothing else is
/// touched), 1 otherwise. A missing index entry is reported as index
/// corruption after the remaining entries have been cleaned up; the row is
/// gone by then and the error's `removed()` detail says so.
pub(crate) fn delete(
    client: &dyn StoreClient,
    keyspace: &KeySpace,
    record: &Record,
) -> Result<u64, InternalError> {
    let record_type = record.record_type();
    let Some(id) = record.id_token() else {
        return Ok(0);
    };

    if client.hdel(&keyspace.table(), &[id.clone()])? == 0 {
        debug!(record_type = record_type.name(), id = %id, "delete found no record");
        return Ok(0);
    }

    let tokens = match record.snapshot_for_current_id() {
        Some(snapshot) => snapshot.tokens().clone(),
        None => record.index_tokens(),
    };

    let mut index_removes = 0_u64;
    let mut corruption = None;
    for (pos, token) in &tokens {
        let field = &record_type.fields()[*pos];
        let key = keyspace.index(field.name(), token);
        let removed = if field.is_unique() {
            match client.get(&key)? {
                Some(owner) if owner == id.as_bytes() => client.del(&[key.clone()])?,
                Some(owner) => {
                    warn!(
                        key = %key,
                        id = %id,
                        owner = %String::from_utf8_lossy(&owner),
                        "unique pointer owned by another record, leaving it"
                    );
                    continue;
                }
                None => 0,
            }
        } else {
            client.srem(&key, &[id.as_bytes().to_vec()])?
        };

        if removed == 0 {
            corruption.get_or_insert_with(|| {
                InternalError::index_corruption(format!(
                    "index '{key}' had no entry for '{}' id '{id}'",
                    record_type.name()
                ))
                .with_detail(ErrorDetail::Deleted { removed: 1 })
            });
        }
        index_removes += removed;
    }

    let structures = record_type
        .structure_fields()
        .map(|(_, field)| keyspace.structure(&id, field.name()))
        .collect::<Vec<_>>();
    if !structures.is_empty() {
        client.del(&structures)?;
    }

    debug!(
        record_type = record_type.name(),
        id = %id,
        index_removes,
        "deleted record"
    );
    sink::record(MetricsEvent::Delete {
        type_name: record_type.name(),
        removed: 1,
        index_removes,
    });

    match corruption {
        Some(err) => Err(err),
        None => Ok(1),
    }
}
