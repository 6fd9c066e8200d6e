//! Core runtime for stashdb: record types, values, the staging buffer and
//! commit protocol, remote structures, the query resolver and the store
//! client contract.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod record;
pub mod serialize;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{Db, query::Query, registry::RegisterOptions},
        model::{FieldModel, RecordType, StructureKind},
        record::Record,
        value::Value,
    };
}
