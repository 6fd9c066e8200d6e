use crate::{
    db::{
        store::StoreClient,
        structure::{Element, Remote, decode_all, encode_all, impl_handle_common},
    },
    error::InternalError,
};
use std::sync::Arc;

///
/// Set
///
/// Unordered collection of distinct members backed by a store set.
///

#[derive(Debug)]
pub struct Set<T> {
    remote: Remote,
    pending: Vec<T>,
    cache: Option<Vec<T>>,
}

impl<T: Element> Set<T> {
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            remote: Remote::new(client, key.into()),
            pending: Vec::new(),
            cache: None,
        }
    }

    pub fn size(&self) -> Result<u64, InternalError> {
        Ok(self.remote.client().scard(self.remote.key())?)
    }

    pub fn contains(&self, member: &T) -> Result<bool, InternalError> {
        Ok(self
            .remote
            .client()
            .sismember(self.remote.key(), &member.to_bytes()?)?)
    }

    /// Members in store order, fetched once per handle.
    pub fn members(&mut self) -> Result<&[T], InternalError> {
        if self.cache.is_none() {
            let raw = self.remote.client().smembers(self.remote.key())?;
            self.cache = Some(decode_all(&raw)?);
        }

        Ok(self.cache.as_deref().unwrap_or_default())
    }

    pub fn add(&mut self, member: T) {
        self.pending.push(member);
    }

    pub fn update(&mut self, members: impl IntoIterator<Item = T>) {
        self.pending.extend(members);
    }

    /// Remove one member immediately. Returns whether it was present.
    pub fn discard(&mut self, member: &T) -> Result<bool, InternalError> {
        self.cache = None;

        Ok(self
            .remote
            .client()
            .srem(self.remote.key(), &[member.to_bytes()?])?
            > 0)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Add every queued member; returns how many were new.
    pub fn save(&mut self) -> Result<u64, InternalError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let members = encode_all(&self.pending)?;

        let added = self.remote.client().sadd(self.remote.key(), &members)?;
        self.remote.after_save("set", members.len())?;
        self.pending.clear();
        self.cache = None;

        Ok(added)
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

impl_handle_common!(Set<T>);
