use crate::{
    db::{cache::ObjectCache, keyspace::KeySpace, store::StoreClient},
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::RecordType,
};
use parking_lot::{Mutex, MutexGuard};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("record type '{0}' is not registered with a store")]
    TypeNotRegistered(String),

    #[error("record type '{0}' is already registered")]
    TypeAlreadyRegistered(String),

    #[error("related name '{related}' on '{target}' is already taken by {owner}")]
    RelationConflict {
        target: String,
        related: String,
        owner: String,
    },

    #[error("'{target}' has no relation named '{related}'")]
    RelationNotFound { target: String, related: String },
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::TypeNotRegistered(_) | Self::RelationNotFound { .. } => {
                ErrorClass::NotRegistered
            }
            Self::TypeAlreadyRegistered(_) | Self::RelationConflict { .. } => {
                ErrorClass::InvalidSchema
            }
        }
    }
}

impl From<RegistryError> for InternalError {
    fn from(err: RegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

///
/// RegisterOptions
///
/// Per-registration overrides. Unset values fall back to the record
/// type's own namespace/ttl, then to the defaults.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterOptions {
    pub namespace: Option<String>,
    pub ttl: Option<Duration>,
}

impl RegisterOptions {
    #[must_use]
    pub fn namespace(mut self, prefix: &str) -> Self {
        self.namespace = Some(prefix.to_string());
        self
    }

    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Fill unset values from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        Self {
            namespace: self.namespace.or_else(|| fallback.namespace.clone()),
            ttl: self.ttl.or(fallback.ttl),
        }
    }
}

///
/// Registration
///
/// One record type bound to its store client, key space and staging
/// buffer. The buffer is created on the first staged write.
///

pub(crate) struct Registration {
    record_type: Arc<RecordType>,
    client: Arc<dyn StoreClient>,
    keyspace: KeySpace,
    ttl: Option<Duration>,
    buffer: Mutex<Option<ObjectCache>>,
}

impl Registration {
    pub(crate) fn new(
        record_type: Arc<RecordType>,
        client: Arc<dyn StoreClient>,
        prefix: &str,
        ttl: Option<Duration>,
    ) -> Self {
        let keyspace = KeySpace::new(prefix, record_type.name());

        Self {
            record_type,
            client,
            keyspace,
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            buffer: Mutex::new(None),
        }
    }

    pub(crate) const fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub(crate) fn client(&self) -> &dyn StoreClient {
        self.client.as_ref()
    }

    pub(crate) const fn shared_client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub(crate) const fn keyspace(&self) -> &KeySpace {
        &self.keyspace
    }

    pub(crate) const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Lock the staging buffer slot.
    pub(crate) fn buffer(&self) -> MutexGuard<'_, Option<ObjectCache>> {
        self.buffer.lock()
    }

    /// Objects staged and not yet flushed.
    pub(crate) fn pending(&self) -> usize {
        self.buffer.lock().as_ref().map_or(0, ObjectCache::len)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("record_type", &self.record_type.name())
            .field("client", &self.client.name())
            .field("keyspace", &self.keyspace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

///
/// TypeRegistry
///
/// Record type name → registration.
///

#[derive(Debug, Default)]
pub(crate) struct TypeRegistry {
    types: BTreeMap<String, Arc<Registration>>,
}

impl TypeRegistry {
    pub(crate) fn register(&mut self, registration: Registration) -> Result<(), InternalError> {
        let name = registration.record_type().name().to_string();
        if self.types.contains_key(&name) {
            return Err(RegistryError::TypeAlreadyRegistered(name).into());
        }
        self.types.insert(name, Arc::new(registration));

        Ok(())
    }

    pub(crate) fn try_get(&self, type_name: &str) -> Result<Arc<Registration>, InternalError> {
        self.types
            .get(type_name)
            .cloned()
            .ok_or_else(|| RegistryError::TypeNotRegistered(type_name.to_string()).into())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.types.values()
    }

    pub(crate) fn clear(&mut self) {
        self.types.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::store::MemoryStore, test_support::instrument_type};

    fn registration(prefix: &str) -> Registration {
        Registration::new(instrument_type(), Arc::new(MemoryStore::new()), prefix, None)
    }

    #[test]
    fn register_then_resolve_by_type_name() {
        let mut registry = TypeRegistry::default();
        registry
            .register(registration("t."))
            .expect("first registration should succeed");

        let reg = registry
            .try_get("instrument")
            .expect("registered type should resolve");
        assert_eq!(reg.keyspace().table(), "t.instrument");
        assert_eq!(reg.pending(), 0, "buffer is created lazily");
    }

    #[test]
    fn unknown_type_is_not_registered() {
        let registry = TypeRegistry::default();
        let err = registry
            .try_get("fund")
            .expect_err("unknown type should not resolve");

        assert!(err.is_not_registered());
        assert_eq!(err.origin, ErrorOrigin::Registry);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TypeRegistry::default();
        registry.register(registration("a.")).expect("first should succeed");

        let err = registry
            .register(registration("b."))
            .expect_err("second registration should fail");
        assert_eq!(err.class, ErrorClass::InvalidSchema);
    }

    #[test]
    fn options_fall_back_field_by_field() {
        let fallback = RegisterOptions::default()
            .namespace("base.")
            .ttl(Duration::from_secs(5));
        let merged = RegisterOptions::default().namespace("own.").or(&fallback);

        assert_eq!(merged.namespace.as_deref(), Some("own."));
        assert_eq!(merged.ttl, Some(Duration::from_secs(5)));
    }
}
