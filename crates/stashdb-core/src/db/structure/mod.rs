//! Remote structure handles.
//!
//! A handle is a thin client-side reference to one container key. Writes
//! are queued locally and only reach the store on `save()`; reads either
//! go straight to the store (`size`, `contains`, `get`, ranges) or fill a
//! read cache that lives as long as the handle. The cache is never shared
//! between handles and may go stale under concurrent mutation; `refresh`
//! drops it and `save` invalidates it.

mod hash;
mod list;
mod ordered_set;
mod set;
mod sorted_map;


use crate::{
    db::store::StoreClient,
    error::InternalError,
    serialize::{deserialize, serialize},
    value::Value,
};
use std::{sync::Arc, time::Duration};
use tracing::trace;

pub use hash::HashTable;
pub use list::List;
pub use ordered_set::OrderedSet;
pub use set::Set;
pub use sorted_map::SortedMap;

///
/// Element
///
/// Encoding of one structure member or value. Text and integers are stored
/// as UTF-8 text so that other store clients can read them; bytes are
/// stored raw and dynamic values as CBOR.
///

pub trait Element: Clone + Sized {
    fn to_bytes(&self) -> Result<Vec<u8>, InternalError>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, InternalError>;
}

impl Element for String {
    fn to_bytes(&self) -> Result<Vec<u8>, InternalError> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, InternalError> {
        Self::from_utf8(bytes.to_vec())
            .map_err(|_| InternalError::bad_structure("element is not valid UTF-8 text"))
    }
}

impl Element for i64 {
    fn to_bytes(&self) -> Result<Vec<u8>, InternalError> {
        Ok(self.to_string().into_bytes())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, InternalError> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| InternalError::bad_structure("element is not an integer"))
    }
}

impl Element for Vec<u8> {
    fn to_bytes(&self) -> Result<Vec<u8>, InternalError> {
        Ok(self.clone())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, InternalError> {
        Ok(bytes.to_vec())
    }
}

impl Element for Value {
    fn to_bytes(&self) -> Result<Vec<u8>, InternalError> {
        Ok(serialize(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, InternalError> {
        deserialize(bytes)
            .map_err(|err| InternalError::bad_structure(format!("element is not a value: {err}")))
    }
}

pub(crate) fn encode_all<T: Element>(items: &[T]) -> Result<Vec<Vec<u8>>, InternalError> {
    items.iter().map(Element::to_bytes).collect()
}

pub(crate) fn decode_all<T: Element>(items: &[Vec<u8>]) -> Result<Vec<T>, InternalError> {
    items.iter().map(|bytes| T::from_bytes(bytes)).collect()
}

///
/// Remote
///
/// Addressing shared by every handle: the client, the key and the expiry
/// applied when pending writes are saved.
///

#[derive(Clone)]
pub(crate) struct Remote {
    client: Arc<dyn StoreClient>,
    key: String,
    ttl: Option<Duration>,
}

impl Remote {
    pub(crate) fn new(client: Arc<dyn StoreClient>, key: String) -> Self {
        Self {
            client,
            key,
            ttl: None,
        }
    }

    pub(crate) fn client(&self) -> &dyn StoreClient {
        self.client.as_ref()
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn set_ttl(&mut self, ttl: Option<Duration>) {
        self.ttl = ttl.filter(|ttl| !ttl.is_zero());
    }

    /// Apply the handle's expiry after a save that wrote `written` items.
    pub(crate) fn after_save(&self, kind: &str, written: usize) -> Result<(), InternalError> {
        if let Some(ttl) = self.ttl {
            self.client.expire(&self.key, ttl)?;
        }
        trace!(key = %self.key, kind, written, "structure saved");

        Ok(())
    }

    /// Remove the whole container.
    pub(crate) fn delete(&self) -> Result<bool, InternalError> {
        Ok(self.client.del(&[self.key.clone()])? > 0)
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("client", &self.client.name())
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Common surface of every structure handle.
macro_rules! impl_handle_common {
    ($handle:ident < $param:ident >) => {
        impl<$param: $crate::db::structure::Element> $handle<$param> {
            /// Key of the remote container.
            #[must_use]
            pub fn key(&self) -> &str {
                self.remote.key()
            }

            /// Expire the container `ttl` after each save.
            #[must_use]
            pub fn with_ttl(mut self, ttl: ::std::time::Duration) -> Self {
                self.remote.set_ttl(Some(ttl));
                self
            }

            /// Drop the read cache; the next iteration refetches.
            pub fn refresh(&mut self) {
                self.cache = None;
            }

            /// Remove the whole container from the store and forget
            /// pending writes.
            pub fn delete(&mut self) -> Result<bool, $crate::error::InternalError> {
                self.cache = None;
                self.clear_pending();
                self.remote.delete()
            }
        }
    };
}

pub(crate) use impl_handle_common;
