pub(crate) mod cache;
pub(crate) mod commit;
pub mod keyspace;
pub mod query;
pub mod registry;
pub(crate) mod relation;
pub mod store;
pub mod structure;

#[cfg(test)]
mod tests;

use crate::{
    db::{
        cache::ObjectCache,
        keyspace::{DEFAULT_PREFIX, SEPARATOR},
        query::Query,
        registry::{RegisterOptions, Registration, RegistryError, TypeRegistry},
        relation::RelationTable,
        store::StoreClient,
        structure::{Element, HashTable, List, OrderedSet, Set, SortedMap},
    },
    error::{ErrorOrigin, InternalError},
    model::{FieldKind, RecordType, StructureKind, record_type::normalize_type_name},
    obs::sink::{self, MetricsEvent, MetricsSink},
    record::Record,
    value::Value,
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, info};

///
/// Db
///
/// Explicit registry of record types and their store clients. Created
/// once at startup and passed to every call; `shutdown` flushes what is
/// still staged and tears the registrations down.
///
/// Every registered type owns an independent staging buffer, so stages
/// and flushes of different types never contend.
///

#[derive(Default)]
pub struct Db {
    types: RwLock<TypeRegistry>,
    relations: RwLock<RelationTable>,
    default_client: Option<(Arc<dyn StoreClient>, RegisterOptions)>,
    type_options: BTreeMap<String, RegisterOptions>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl Db {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the metrics sink for operations run through this handle.
    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Client and options used by [`Db::register_configured`].
    #[must_use]
    pub fn with_default_client(
        mut self,
        client: Arc<dyn StoreClient>,
        options: RegisterOptions,
    ) -> Self {
        self.default_client = Some((client, options));
        self
    }

    /// Per-type overrides used by [`Db::register_configured`]. The name is
    /// normalized the same way record type names are.
    #[must_use]
    pub fn with_type_options(mut self, type_name: &str, options: RegisterOptions) -> Self {
        let name = normalize_type_name(type_name).unwrap_or_else(|_| type_name.to_string());
        self.type_options.insert(name, options);
        self
    }

    pub(crate) fn with_metrics<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.metrics {
            Some(sink) => sink::with_metrics_sink(sink, f),
            None => f(),
        }
    }

    //
    // Registration
    //

    /// Bind a record type to a store client.
    ///
    /// The key prefix is taken from `options`, then from the record type,
    /// then [`DEFAULT_PREFIX`]; the ttl likewise. Foreign keys declared on
    /// the type are entered into the relation table.
    pub fn register(
        &self,
        record_type: Arc<RecordType>,
        client: Arc<dyn StoreClient>,
        options: RegisterOptions,
    ) -> Result<(), InternalError> {
        let prefix = options
            .namespace
            .as_deref()
            .or_else(|| record_type.namespace())
            .unwrap_or(DEFAULT_PREFIX)
            .to_string();
        if prefix.contains(SEPARATOR) {
            return Err(InternalError::invalid_schema(format!(
                "namespace '{prefix}' contains the key separator '{SEPARATOR}'"
            )));
        }
        let ttl = options.ttl.or_else(|| record_type.ttl());

        let mut types = self.types.write();
        if types.try_get(record_type.name()).is_ok() {
            return Err(RegistryError::TypeAlreadyRegistered(record_type.name().to_string()).into());
        }
        self.relations.write().register(&record_type)?;

        info!(
            record_type = record_type.name(),
            client = client.name(),
            prefix = %prefix,
            ttl_secs = ttl.map(|ttl| ttl.as_secs()),
            "registered record type"
        );
        types.register(Registration::new(record_type, client, &prefix, ttl))
    }

    /// Register against the default client, applying any per-type
    /// overrides set with [`Db::with_type_options`].
    pub fn register_configured(&self, record_type: Arc<RecordType>) -> Result<(), InternalError> {
        let Some((client, defaults)) = &self.default_client else {
            return Err(InternalError::not_configured(
                ErrorOrigin::Registry,
                format!(
                    "no default store client configured for '{}'",
                    record_type.name()
                ),
            ));
        };
        let options = self
            .type_options
            .get(record_type.name())
            .cloned()
            .unwrap_or_default()
            .or(defaults);

        self.register(record_type, Arc::clone(client), options)
    }

    #[must_use]
    pub fn is_registered(&self, record_type: &RecordType) -> bool {
        self.types.read().try_get(record_type.name()).is_ok()
    }

    fn registration(&self, type_name: &str) -> Result<Arc<Registration>, InternalError> {
        self.types.read().try_get(type_name)
    }

    //
    // Staging and flushing
    //

    /// Stage a record for the next flush of its type.
    ///
    /// A record without an id gets one allocated from the type's counter
    /// right away, so the caller can reference it before flushing. No
    /// other store command is issued.
    pub fn stage(&self, record: &mut Record) -> Result<(), InternalError> {
        self.with_metrics(|| {
            let reg = self.registration(record.type_name())?;
            let record_type = reg.record_type();
            if record.record_type().fields() != record_type.fields() {
                return Err(InternalError::invalid_schema(format!(
                    "record does not match the registered layout of '{}'",
                    record_type.name()
                )));
            }

            if record.id().is_null() {
                if matches!(record_type.primary_key().kind(), FieldKind::Auto) {
                    let id = commit::allocate_id(reg.client(), reg.keyspace(), record_type)?;
                    record.set_id(id);
                } else {
                    return Err(InternalError::field_constraint(
                        ErrorOrigin::Record,
                        format!("primary key of '{}' is not set", record_type.name()),
                    ));
                }
            }
            record.validate()?;

            sink::record(MetricsEvent::Stage {
                type_name: record_type.name(),
            });
            reg.buffer()
                .get_or_insert_with(|| {
                    ObjectCache::new(Arc::clone(record_type), reg.keyspace().clone())
                })
                .stage(record.clone())?;
            record.set_snapshot(record.take_snapshot());

            Ok(())
        })
    }

    /// Commit everything staged for `record_type`. Returns the number of
    /// objects written; on failure the buffer is kept for a retry.
    pub fn flush(&self, record_type: &RecordType) -> Result<usize, InternalError> {
        self.with_metrics(|| {
            let reg = self.registration(record_type.name())?;
            let mut buffer = reg.buffer();
            match buffer.as_mut() {
                Some(cache) => commit::commit(reg.client(), reg.ttl(), cache),
                None => Ok(0),
            }
        })
    }

    /// Objects staged for `record_type` and not yet flushed.
    pub fn pending(&self, record_type: &RecordType) -> Result<usize, InternalError> {
        Ok(self.registration(record_type.name())?.pending())
    }

    //
    // Deletion
    //

    /// Delete a loaded record. Returns 1 if it was removed, 0 if it was
    /// not in the store.
    ///
    /// An index corruption error means the row itself was already removed;
    /// [`InternalError::removed`] reports the count for cascading callers.
    pub fn delete(&self, record: &Record) -> Result<u64, InternalError> {
        self.with_metrics(|| {
            let reg = self.registration(record.type_name())?;
            commit::delete(reg.client(), reg.keyspace(), record)
        })
    }

    /// Load the record stored under `id` and delete it.
    pub fn delete_id(
        &self,
        record_type: &RecordType,
        id: impl Into<Value>,
    ) -> Result<u64, InternalError> {
        match self.load(record_type, id)? {
            Some(record) => self.delete(&record),
            None => Ok(0),
        }
    }

    /// Delete every record of `record_type`, index entries included. The
    /// id counter is left alone so ids are never reused.
    pub fn clear_type(&self, record_type: &RecordType) -> Result<u64, InternalError> {
        let records = self.query(record_type)?.all()?;
        let mut removed = 0;
        for record in &records {
            removed += self.delete(record)?;
        }
        debug!(record_type = record_type.name(), removed, "cleared record type");

        Ok(removed)
    }

    //
    // Reads
    //

    /// Start a query over `record_type`.
    pub fn query(&self, record_type: &RecordType) -> Result<Query<'_>, InternalError> {
        Ok(Query::new(self, self.registration(record_type.name())?))
    }

    /// Primary-key lookup.
    pub fn load(
        &self,
        record_type: &RecordType,
        id: impl Into<Value>,
    ) -> Result<Option<Record>, InternalError> {
        self.query(record_type)?
            .filter(record_type.primary_key().name(), id)
            .first()
    }

    /// Follow the foreign key `field` of `record` to the record it names.
    pub fn load_related(&self, record: &Record, field: &str) -> Result<Option<Record>, InternalError> {
        let target = record
            .record_type()
            .field(field)
            .and_then(|f| f.target())
            .ok_or_else(|| {
                InternalError::field_constraint(
                    ErrorOrigin::Record,
                    format!("field '{field}' of '{}' is not a foreign key", record.type_name()),
                )
            })?;
        let Some(id) = record.get(field).filter(|value| !value.is_null()) else {
            return Ok(None);
        };

        let reg = self.registration(target)?;
        self.load(reg.record_type(), id.clone())
    }

    /// Records of another type whose foreign key points at `record`,
    /// looked up through the relation's related name.
    pub fn related(&self, record: &Record, related_name: &str) -> Result<Query<'_>, InternalError> {
        let edge = self
            .relations
            .read()
            .resolve(record.type_name(), related_name)
            .cloned()
            .ok_or_else(|| RegistryError::RelationNotFound {
                target: record.type_name().to_string(),
                related: related_name.to_string(),
            })?;
        let id = existing_id(record, ErrorOrigin::Query)?;

        Ok(Query::new(self, self.registration(&edge.source)?).filter(&edge.field, id))
    }

    //
    // Structure-backed fields
    //

    pub fn list<T: Element>(&self, record: &Record, field: &str) -> Result<List<T>, InternalError> {
        let (client, key, ttl) = self.structure_target(record, field, StructureKind::List)?;
        Ok(with_ttl(List::new(client, key), ttl, List::with_ttl))
    }

    pub fn set<T: Element>(&self, record: &Record, field: &str) -> Result<Set<T>, InternalError> {
        let (client, key, ttl) = self.structure_target(record, field, StructureKind::Set)?;
        Ok(with_ttl(Set::new(client, key), ttl, Set::with_ttl))
    }

    pub fn ordered_set<T: Element>(
        &self,
        record: &Record,
        field: &str,
    ) -> Result<OrderedSet<T>, InternalError> {
        let (client, key, ttl) = self.structure_target(record, field, StructureKind::OrderedSet)?;
        Ok(with_ttl(OrderedSet::new(client, key), ttl, OrderedSet::with_ttl))
    }

    pub fn hash_table<V: Element>(
        &self,
        record: &Record,
        field: &str,
    ) -> Result<HashTable<V>, InternalError> {
        let (client, key, ttl) = self.structure_target(record, field, StructureKind::Hash)?;
        Ok(with_ttl(HashTable::new(client, key), ttl, HashTable::with_ttl))
    }

    pub fn sorted_map<V: Element>(
        &self,
        record: &Record,
        field: &str,
    ) -> Result<SortedMap<V>, InternalError> {
        let (client, key, ttl) = self.structure_target(record, field, StructureKind::SortedMap)?;
        Ok(with_ttl(SortedMap::new(client, key), ttl, SortedMap::with_ttl))
    }

    // Client, key and ttl of one structure field of a stored record.
    fn structure_target(
        &self,
        record: &Record,
        field: &str,
        kind: StructureKind,
    ) -> Result<(Arc<dyn StoreClient>, String, Option<Duration>), InternalError> {
        let Some(model) = record.record_type().field(field) else {
            return Err(InternalError::field_constraint(
                ErrorOrigin::Structure,
                format!("'{}' has no field '{field}'", record.type_name()),
            ));
        };
        if model.structure_kind() != Some(kind) {
            return Err(InternalError::bad_structure(format!(
                "field '{field}' of '{}' is not a {kind}",
                record.type_name()
            )));
        }

        let reg = self.registration(record.type_name())?;
        let id = existing_id(record, ErrorOrigin::Structure)?;
        let token = id.id_token().ok_or_else(|| {
            InternalError::field_constraint(
                ErrorOrigin::Structure,
                format!("{id} is not a valid id for '{}'", record.type_name()),
            )
        })?;
        let key = reg.keyspace().structure(&token, field);

        Ok((Arc::clone(reg.shared_client()), key, reg.ttl()))
    }

    //
    // Lifecycle
    //

    /// Flush every non-empty staging buffer, then drop all registrations.
    /// A failed flush leaves the registry intact so the caller can retry.
    pub fn shutdown(&self) -> Result<usize, InternalError> {
        let registrations = self.types.read().iter().cloned().collect::<Vec<_>>();
        let mut written = 0;
        for reg in &registrations {
            written += self.flush(reg.record_type())?;
        }

        self.types.write().clear();
        self.relations.write().clear();
        info!(written, types = registrations.len(), "registry shut down");

        Ok(written)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("types", &*self.types.read())
            .field("relations", &*self.relations.read())
            .field("type_options", &self.type_options)
            .finish_non_exhaustive()
    }
}

fn existing_id(record: &Record, origin: ErrorOrigin) -> Result<Value, InternalError> {
    let id = record.id();
    if id.is_null() {
        return Err(InternalError::field_constraint(
            origin,
            format!("'{}' record has no id yet, stage it first", record.type_name()),
        ));
    }

    Ok(id.clone())
}

fn with_ttl<H>(handle: H, ttl: Option<Duration>, apply: fn(H, Duration) -> H) -> H {
    match ttl {
        Some(ttl) => apply(handle, ttl),
        None => handle,
    }
}
