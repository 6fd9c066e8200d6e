use crate::{
    db::{
        store::StoreClient,
        structure::{Element, Remote, decode_all, encode_all, impl_handle_common},
    },
    error::InternalError,
};
use std::sync::Arc;

///
/// List
///
/// Double-ended sequence backed by a store list. Pushes are queued until
/// `save`; pops go to the store immediately.
///

#[derive(Debug)]
pub struct List<T> {
    remote: Remote,
    pending_front: Vec<T>,
    pending_back: Vec<T>,
    cache: Option<Vec<T>>,
}

impl<T: Element> List<T> {
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            remote: Remote::new(client, key.into()),
            pending_front: Vec::new(),
            pending_back: Vec::new(),
            cache: None,
        }
    }

    pub fn size(&self) -> Result<u64, InternalError> {
        Ok(self.remote.client().llen(self.remote.key())?)
    }

    /// Full list contents, fetched once per handle.
    pub fn items(&mut self) -> Result<&[T], InternalError> {
        if self.cache.is_none() {
            let raw = self.remote.client().lrange(self.remote.key(), 0, -1)?;
            self.cache = Some(decode_all(&raw)?);
        }

        Ok(self.cache.as_deref().unwrap_or_default())
    }

    /// Queue a value for the head; later calls end up nearer the head.
    pub fn push_front(&mut self, value: T) {
        self.pending_front.push(value);
    }

    /// Queue a value for the tail.
    pub fn push_back(&mut self, value: T) {
        self.pending_back.push(value);
    }

    pub fn pop_front(&mut self) -> Result<Option<T>, InternalError> {
        self.cache = None;
        self.remote
            .client()
            .lpop(self.remote.key())?
            .map(|bytes| T::from_bytes(&bytes))
            .transpose()
    }

    pub fn pop_back(&mut self) -> Result<Option<T>, InternalError> {
        self.cache = None;
        self.remote
            .client()
            .rpop(self.remote.key())?
            .map(|bytes| T::from_bytes(&bytes))
            .transpose()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending_front.len() + self.pending_back.len()
    }

    /// Push queued values; returns the list length afterwards.
    pub fn save(&mut self) -> Result<u64, InternalError> {
        let written = self.pending();
        if written == 0 {
            return self.size();
        }
        let client = self.remote.client();
        let key = self.remote.key();

        // A queue is drained as soon as its own push lands.
        self.cache = None;
        let mut len = 0;
        if !self.pending_back.is_empty() {
            len = client.rpush(key, &encode_all(&self.pending_back)?)?;
            self.pending_back.clear();
        }
        if !self.pending_front.is_empty() {
            len = client.lpush(key, &encode_all(&self.pending_front)?)?;
            self.pending_front.clear();
        }
        self.remote.after_save("list", written)?;

        Ok(len)
    }

    fn clear_pending(&mut self) {
        self.pending_front.clear();
        self.pending_back.clear();
    }
}

impl_handle_common!(List<T>);
