//! Write-staging buffer.
//!
//! One `ObjectCache` exists per registered record type and commit cycle.
//! Staging is purely local; the commit protocol drains the buffer.

use crate::{
    db::keyspace::KeySpace,
    error::InternalError,
    model::RecordType,
    record::Record,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::trace;

///
/// ObjectCache
///
/// Pending objects keyed by id, unique pointer writes, index-set unions,
/// and the stale entries that updated objects left behind.
///

#[derive(Debug)]
pub(crate) struct ObjectCache {
    record_type: Arc<RecordType>,
    keyspace: KeySpace,
    objects: BTreeMap<String, Record>,
    unique_index_writes: BTreeMap<String, String>,
    set_index_writes: BTreeMap<String, BTreeSet<String>>,
    unique_index_removals: BTreeMap<String, String>,
    set_index_removals: BTreeMap<String, BTreeSet<String>>,
}

impl ObjectCache {
    pub(crate) const fn new(record_type: Arc<RecordType>, keyspace: KeySpace) -> Self {
        Self {
            record_type,
            keyspace,
            objects: BTreeMap::new(),
            unique_index_writes: BTreeMap::new(),
            set_index_writes: BTreeMap::new(),
            unique_index_removals: BTreeMap::new(),
            set_index_removals: BTreeMap::new(),
        }
    }

    /// Stage a record that already carries its id.
    ///
    /// Re-staging an id within the same cycle replaces its pending index
    /// contributions. If the record remembers older index tokens, any
    /// token that changed is queued for removal.
    pub(crate) fn stage(&mut self, record: Record) -> Result<(), InternalError> {
        let Some(id) = record.id_token() else {
            return Err(InternalError::cache_internal(format!(
                "cannot stage '{}' without an id",
                self.record_type.name()
            )));
        };

        if let Some(previous) = self.objects.remove(&id) {
            self.withdraw(&id, &previous.index_tokens());
        }

        let tokens = record.index_tokens();
        for (&pos, token) in &tokens {
            let field = &self.record_type.fields()[pos];
            let key = self.keyspace.index(field.name(), token);
            if field.is_unique() {
                if self.unique_index_removals.get(&key) == Some(&id) {
                    self.unique_index_removals.remove(&key);
                }
                self.unique_index_writes.insert(key, id.clone());
            } else {
                remove_member(&mut self.set_index_removals, &key, &id);
                self.set_index_writes
                    .entry(key)
                    .or_default()
                    .insert(id.clone());
            }
        }

        if let Some(snapshot) = record.snapshot_for_current_id() {
            for (&pos, old) in snapshot.tokens() {
                if tokens.get(&pos) == Some(old) {
                    continue;
                }
                let field = &self.record_type.fields()[pos];
                let key = self.keyspace.index(field.name(), old);
                if field.is_unique() {
                    self.unique_index_removals.insert(key, id.clone());
                } else {
                    self.set_index_removals
                        .entry(key)
                        .or_default()
                        .insert(id.clone());
                }
            }
        }

        trace!(
            record_type = self.record_type.name(),
            id = %id,
            indexed = tokens.len(),
            "staged record"
        );
        self.objects.insert(id, record);

        Ok(())
    }

    // Drop the index contributions a previously staged version made.
    fn withdraw(&mut self, id: &str, tokens: &BTreeMap<usize, String>) {
        for (&pos, token) in tokens {
            let field = &self.record_type.fields()[pos];
            let key = self.keyspace.index(field.name(), token);
            if field.is_unique() {
                if self.unique_index_writes.get(&key).map(String::as_str) == Some(id) {
                    self.unique_index_writes.remove(&key);
                }
            } else {
                remove_member(&mut self.set_index_writes, &key, id);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) const fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub(crate) const fn keyspace(&self) -> &KeySpace {
        &self.keyspace
    }

    pub(crate) const fn objects(&self) -> &BTreeMap<String, Record> {
        &self.objects
    }

    pub(crate) const fn unique_index_writes(&self) -> &BTreeMap<String, String> {
        &self.unique_index_writes
    }

    pub(crate) const fn set_index_writes(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.set_index_writes
    }

    pub(crate) const fn unique_index_removals(&self) -> &BTreeMap<String, String> {
        &self.unique_index_removals
    }

    pub(crate) const fn set_index_removals(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.set_index_removals
    }

    pub(crate) fn clear(&mut self) {
        self.objects.clear();
        self.unique_index_writes.clear();
        self.set_index_writes.clear();
        self.unique_index_removals.clear();
        self.set_index_removals.clear();
    }
}

fn remove_member(map: &mut BTreeMap<String, BTreeSet<String>>, key: &str, id: &str) {
    if let Some(ids) = map.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}
