use crate::{
    db::{
        store::StoreClient,
        structure::{Element, Remote, impl_handle_common},
    },
    error::InternalError,
};
use std::{collections::BTreeMap, sync::Arc};

///
/// HashTable
///
/// Field → value container backed by a store hash.
///

#[derive(Debug)]
pub struct HashTable<V> {
    remote: Remote,
    pending: BTreeMap<String, V>,
    cache: Option<Vec<(String, V)>>,
}

impl<V: Element> HashTable<V> {
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            remote: Remote::new(client, key.into()),
            pending: BTreeMap::new(),
            cache: None,
        }
    }

    /// Number of fields in the store.
    pub fn size(&self) -> Result<u64, InternalError> {
        Ok(self.remote.client().hlen(self.remote.key())?)
    }

    pub fn contains(&self, field: &str) -> Result<bool, InternalError> {
        Ok(self.remote.client().hget(self.remote.key(), field)?.is_some())
    }

    pub fn get(&self, field: &str) -> Result<Option<V>, InternalError> {
        self.remote
            .client()
            .hget(self.remote.key(), field)?
            .map(|bytes| V::from_bytes(&bytes))
            .transpose()
    }

    /// One entry per requested field, `None` where absent.
    pub fn mget(&self, fields: &[&str]) -> Result<Vec<Option<V>>, InternalError> {
        let fields = fields.iter().map(ToString::to_string).collect::<Vec<_>>();
        self.remote
            .client()
            .hmget(self.remote.key(), &fields)?
            .into_iter()
            .map(|bytes| bytes.map(|b| V::from_bytes(&b)).transpose())
            .collect()
    }

    pub fn keys(&mut self) -> Result<Vec<String>, InternalError> {
        Ok(self.items()?.iter().map(|(k, _)| k.clone()).collect())
    }

    pub fn values(&mut self) -> Result<Vec<V>, InternalError> {
        Ok(self.items()?.iter().map(|(_, v)| v.clone()).collect())
    }

    /// All field/value pairs, fetched once per handle.
    pub fn items(&mut self) -> Result<&[(String, V)], InternalError> {
        if self.cache.is_none() {
            let items = self
                .remote
                .client()
                .hgetall(self.remote.key())?
                .into_iter()
                .map(|(field, bytes)| V::from_bytes(&bytes).map(|v| (field, v)))
                .collect::<Result<Vec<_>, _>>()?;
            self.cache = Some(items);
        }

        Ok(self.cache.as_deref().unwrap_or_default())
    }

    /// Queue one field write.
    pub fn add(&mut self, field: impl Into<String>, value: V) {
        self.pending.insert(field.into(), value);
    }

    /// Queue several field writes.
    pub fn update(&mut self, entries: impl IntoIterator<Item = (String, V)>) {
        self.pending.extend(entries);
    }

    /// Remove one field immediately. Returns whether it existed.
    pub fn remove(&mut self, field: &str) -> Result<bool, InternalError> {
        self.cache = None;
        self.pending.remove(field);

        Ok(self
            .remote
            .client()
            .hdel(self.remote.key(), &[field.to_string()])?
            > 0)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Write every queued field in one bulk command.
    pub fn save(&mut self) -> Result<usize, InternalError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let pairs = self
            .pending
            .iter()
            .map(|(field, value)| value.to_bytes().map(|bytes| (field.clone(), bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        self.remote.client().hmset(self.remote.key(), &pairs)?;
        self.remote.after_save("hash", pairs.len())?;
        self.pending.clear();
        self.cache = None;

        Ok(pairs.len())
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

impl_handle_common!(HashTable<V>);
