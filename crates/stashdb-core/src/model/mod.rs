//! Runtime schema model.
//!
//! A record type is declared once through [`RecordTypeBuilder`] and shared
//! immutably (`Arc<RecordType>`) by every record instance, staging buffer
//! and query of that type. Per-instance values live on the record itself,
//! indexed by field position.

pub mod field;
pub mod record_type;


pub use field::{FieldKind, FieldModel, StructureKind};
pub use record_type::{RecordType, RecordTypeBuilder};
