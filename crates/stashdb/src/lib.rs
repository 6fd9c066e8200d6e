//! ## Crate layout
//! - `core`: runtime record model, staging buffer, commit protocol, remote
//!   structures, query resolver and the store client contract.
//! - `config`: TOML configuration and [`open`].
//!
//! The `prelude` module mirrors the surface used by application code.

pub use stashdb_core as core;

pub mod config;

pub use config::{BackendConfig, Config, ConfigError, TypeConfig, open};
pub use core::{
    db::{
        Db,
        query::Query,
        registry::{RegisterOptions, RegistryError},
        store::{MemoryStore, StoreClient, StoreError},
        structure::{Element, HashTable, List, OrderedSet, Set, SortedMap},
    },
    error::{ErrorClass, ErrorOrigin, InternalError as Error},
    obs::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all},
};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        db::{Db, query::Query, registry::RegisterOptions},
        model::{FieldModel, RecordType, StructureKind},
        record::Record,
        value::Value,
    };
}
