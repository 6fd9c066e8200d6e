use crate::{
    db::{
        store::StoreClient,
        structure::{Element, Remote, impl_handle_common},
    },
    error::InternalError,
};
use std::sync::Arc;

///
/// OrderedSet
///
/// Members ranked by a floating-point score, backed by a store sorted set.
///

#[derive(Debug)]
pub struct OrderedSet<T> {
    remote: Remote,
    pending: Vec<(f64, T)>,
    cache: Option<Vec<(T, f64)>>,
}

impl<T: Element> OrderedSet<T> {
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            remote: Remote::new(client, key.into()),
            pending: Vec::new(),
            cache: None,
        }
    }

    pub fn size(&self) -> Result<u64, InternalError> {
        Ok(self.remote.client().zcard(self.remote.key())?)
    }

    /// Members with `min <= score <= max`, ascending unless `desc`.
    /// Always read from the store.
    pub fn range(&self, min: f64, max: f64, desc: bool) -> Result<Vec<(T, f64)>, InternalError> {
        self.remote
            .client()
            .zrangebyscore(self.remote.key(), min, max, desc)?
            .into_iter()
            .map(|(bytes, score)| T::from_bytes(&bytes).map(|member| (member, score)))
            .collect()
    }

    /// Every member in ascending score order, fetched once per handle.
    pub fn items(&mut self) -> Result<&[(T, f64)], InternalError> {
        if self.cache.is_none() {
            self.cache = Some(self.range(f64::NEG_INFINITY, f64::INFINITY, false)?);
        }

        Ok(self.cache.as_deref().unwrap_or_default())
    }

    pub fn add(&mut self, score: f64, member: T) {
        self.pending.push((score, member));
    }

    pub fn update(&mut self, members: impl IntoIterator<Item = (f64, T)>) {
        self.pending.extend(members);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Add or rescore every queued member; returns how many were new.
    pub fn save(&mut self) -> Result<u64, InternalError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let members = self
            .pending
            .iter()
            .map(|(score, member)| member.to_bytes().map(|bytes| (*score, bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        let added = self.remote.client().zadd(self.remote.key(), &members)?;
        self.remote.after_save("ordered_set", members.len())?;
        self.pending.clear();
        self.cache = None;

        Ok(added)
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

impl_handle_common!(OrderedSet<T>);
