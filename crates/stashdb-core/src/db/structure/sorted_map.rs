use crate::{
    db::{
        store::StoreClient,
        structure::{Element, Remote, impl_handle_common},
    },
    error::InternalError,
};
use std::{collections::BTreeMap, sync::Arc};

///
/// SortedMap
///
/// Integer-keyed map stored in a store hash (a timeseries, typically).
/// The store returns hash fields in no useful order, so keys are parsed
/// back to integers and sorted client-side.
///

#[derive(Debug)]
pub struct SortedMap<V> {
    remote: Remote,
    pending: BTreeMap<i64, V>,
    cache: Option<Vec<(i64, V)>>,
}

impl<V: Element> SortedMap<V> {
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            remote: Remote::new(client, key.into()),
            pending: BTreeMap::new(),
            cache: None,
        }
    }

    pub fn size(&self) -> Result<u64, InternalError> {
        Ok(self.remote.client().hlen(self.remote.key())?)
    }

    pub fn contains(&self, key: i64) -> Result<bool, InternalError> {
        Ok(self
            .remote
            .client()
            .hget(self.remote.key(), &key.to_string())?
            .is_some())
    }

    pub fn get(&self, key: i64) -> Result<Option<V>, InternalError> {
        self.remote
            .client()
            .hget(self.remote.key(), &key.to_string())?
            .map(|bytes| V::from_bytes(&bytes))
            .transpose()
    }

    /// Keys in numeric order, ascending unless `desc`.
    pub fn keys(&mut self, desc: bool) -> Result<Vec<i64>, InternalError> {
        Ok(self.items(desc)?.into_iter().map(|(k, _)| k).collect())
    }

    /// Pairs in numeric key order, ascending unless `desc`.
    pub fn items(&mut self, desc: bool) -> Result<Vec<(i64, V)>, InternalError> {
        let sorted = self.sorted()?;
        let mut items = sorted.to_vec();
        if desc {
            items.reverse();
        }

        Ok(items)
    }

    // Ascending pairs, fetched once per handle.
    fn sorted(&mut self) -> Result<&[(i64, V)], InternalError> {
        if self.cache.is_none() {
            let key = self.remote.key();
            let mut items = self
                .remote
                .client()
                .hgetall(key)?
                .into_iter()
                .map(|(field, bytes)| {
                    let k = field.parse::<i64>().map_err(|_| {
                        InternalError::bad_structure(format!(
                            "sorted map '{key}' holds non-integer key '{field}'"
                        ))
                    })?;
                    V::from_bytes(&bytes).map(|v| (k, v))
                })
                .collect::<Result<Vec<_>, _>>()?;
            items.sort_by_key(|(k, _)| *k);
            self.cache = Some(items);
        }

        Ok(self.cache.as_deref().unwrap_or_default())
    }

    pub fn add(&mut self, key: i64, value: V) {
        self.pending.insert(key, value);
    }

    pub fn update(&mut self, entries: impl IntoIterator<Item = (i64, V)>) {
        self.pending.extend(entries);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn save(&mut self) -> Result<usize, InternalError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let pairs = self
            .pending
            .iter()
            .map(|(key, value)| value.to_bytes().map(|bytes| (key.to_string(), bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        self.remote.client().hmset(self.remote.key(), &pairs)?;
        self.remote.after_save("sorted_map", pairs.len())?;
        self.pending.clear();
        self.cache = None;

        Ok(pairs.len())
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

impl_handle_common!(SortedMap<V>);
