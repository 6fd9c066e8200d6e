use crate::{db::store::StoreError, serialize::SerializeError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable classification.
/// `class` says what went wrong, `origin` says which layer noticed it.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a schema-builder rejection.
    pub(crate) fn invalid_schema(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvalidSchema, ErrorOrigin::Schema, message)
    }

    /// Construct a field constraint violation for a given origin.
    pub(crate) fn field_constraint(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::FieldConstraint, origin, message)
    }

    pub(crate) fn not_configured(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotConfigured, origin, message)
    }

    pub(crate) fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::AmbiguousResult, ErrorOrigin::Query, message)
    }

    /// Construct an index-origin corruption error.
    pub(crate) fn index_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Index, message)
    }

    /// Construct a record-origin corruption error (undecodable row).
    pub(crate) fn record_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Record, message)
    }

    pub(crate) fn bad_structure(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::BadStructure, ErrorOrigin::Structure, message)
    }

    /// Construct a cache-origin invariant failure.
    pub(crate) fn cache_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Cache, message)
    }

    #[must_use]
    pub const fn is_not_registered(&self) -> bool {
        matches!(self.class, ErrorClass::NotRegistered)
    }

    #[must_use]
    pub const fn is_field_constraint(&self) -> bool {
        matches!(self.class, ErrorClass::FieldConstraint)
    }

    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self.class, ErrorClass::AmbiguousResult)
    }

    #[must_use]
    pub const fn is_index_corruption(&self) -> bool {
        matches!(
            (self.class, self.origin),
            (ErrorClass::Corruption, ErrorOrigin::Index)
        )
    }

    #[must_use]
    pub const fn is_bad_structure(&self) -> bool {
        matches!(self.class, ErrorClass::BadStructure)
    }

    /// Return the store-level detail, if this error came out of a store command.
    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match &self.detail {
            Some(ErrorDetail::Store(err)) => Some(err),
            _ => None,
        }
    }

    /// Records already removed when a delete failed part way.
    #[must_use]
    pub const fn removed(&self) -> Option<u64> {
        match &self.detail {
            Some(ErrorDetail::Deleted { removed }) => Some(*removed),
            _ => None,
        }
    }

    #[must_use]
    pub(crate) fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreError),

    #[error("{removed} record(s) removed before the error")]
    Deleted { removed: u64 },
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        let class = match err {
            StoreError::WrongType { .. } => ErrorClass::BadStructure,
            _ => ErrorClass::Store,
        };

        Self {
            class,
            origin: ErrorOrigin::Store,
            message: err.to_string(),
            detail: Some(ErrorDetail::Store(err)),
        }
    }
}

impl From<SerializeError> for InternalError {
    fn from(err: SerializeError) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, err.to_string())
    }
}

///
/// ErrorClass
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Store client missing or misconfigured.
    NotConfigured,
    /// Operation on a record type with no bound store.
    NotRegistered,
    /// Required field missing, or a filter on a non-indexed field.
    FieldConstraint,
    /// Expected exactly one result and matched zero or many.
    AmbiguousResult,
    /// Stored state does not match what the protocol wrote.
    Corruption,
    /// Value at a key does not match the expected container kind.
    BadStructure,
    /// Record type declaration rejected by the schema builder.
    InvalidSchema,
    /// Store command or transport failure.
    Store,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotConfigured => "not_configured",
            Self::NotRegistered => "not_registered",
            Self::FieldConstraint => "field_constraint",
            Self::AmbiguousResult => "ambiguous_result",
            Self::Corruption => "corruption",
            Self::BadStructure => "bad_structure",
            Self::InvalidSchema => "invalid_schema",
            Self::Store => "store",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Schema,
    Record,
    Cache,
    Commit,
    Index,
    Query,
    Structure,
    Store,
    Serialize,
    Config,
    Registry,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Record => "record",
            Self::Cache => "cache",
            Self::Commit => "commit",
            Self::Index => "index",
            Self::Query => "query",
            Self::Structure => "structure",
            Self::Store => "store",
            Self::Serialize => "serialize",
            Self::Config => "config",
            Self::Registry => "registry",
        };
        write!(f, "{label}")
    }
}
