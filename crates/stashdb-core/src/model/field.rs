use crate::value::Value;
use std::fmt::{self, Display};

///
/// StructureKind
///
/// Remote container backing a structure field.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StructureKind {
    Hash,
    Set,
    OrderedSet,
    List,
    SortedMap,
}

impl Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hash => "hash",
            Self::Set => "set",
            Self::OrderedSet => "ordered_set",
            Self::List => "list",
            Self::SortedMap => "sorted_map",
        };
        write!(f, "{label}")
    }
}

///
/// FieldKind
///
/// Value shape of a field. Determines which `Value` variants are accepted
/// and how the value hashes into an index key.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Auto-incrementing integer primary key.
    Auto,
    /// Indexed text, hashed to an opaque token.
    Symbol,
    /// Free text; never indexed.
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    /// Id of a record of the target type.
    ForeignKey { target: String },
    /// Value lives in its own remote container, not in the row.
    Structure(StructureKind),
}

impl FieldKind {
    /// Whether a value of this shape may be stored in the field.
    /// `Null` is always shape-compatible; presence is checked separately.
    #[must_use]
    pub const fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Auto | Self::Integer, Value::Int(_) | Value::Uint(_))
                | (Self::Symbol | Self::Text, Value::Text(_))
                | (Self::Float, Value::Float(_) | Value::Int(_))
                | (Self::Boolean, Value::Bool(_))
                | (Self::Date, Value::Date(_))
                | (Self::Timestamp, Value::Timestamp(_) | Value::Int(_))
                | (
                    Self::ForeignKey { .. },
                    Value::Int(_) | Value::Uint(_) | Value::Text(_)
                )
        )
    }

    #[must_use]
    pub const fn is_structure(&self) -> bool {
        matches!(self, Self::Structure(_))
    }
}

///
/// FieldModel
///
/// Field descriptor. Attribute invariants (`unique ⇒ indexed`,
/// `primary_key ⇒ unique ∧ required ∧ indexed`) are enforced when the
/// owning record type is built.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldModel {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) indexed: bool,
    pub(crate) unique: bool,
    pub(crate) ordered: bool,
    pub(crate) required: bool,
    pub(crate) primary_key: bool,
    pub(crate) related_name: Option<String>,
}

impl FieldModel {
    fn with_kind(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            indexed: true,
            unique: false,
            ordered: false,
            required: true,
            primary_key: false,
            related_name: None,
        }
    }

    /// Auto-incrementing integer primary key.
    #[must_use]
    pub fn auto(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Auto).primary_key()
    }

    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Symbol)
    }

    /// Free text: never indexed, optional unless marked required.
    #[must_use]
    pub fn text(name: &str) -> Self {
        Self {
            indexed: false,
            required: false,
            ..Self::with_kind(name, FieldKind::Text)
        }
    }

    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Integer)
    }

    /// Floating point; not indexed unless asked for.
    #[must_use]
    pub fn float(name: &str) -> Self {
        Self {
            indexed: false,
            ..Self::with_kind(name, FieldKind::Float)
        }
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Boolean)
    }

    #[must_use]
    pub fn date(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Date)
    }

    #[must_use]
    pub fn timestamp(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Timestamp)
    }

    /// One-to-many relation to `target`. Always indexed.
    #[must_use]
    pub fn foreign_key(name: &str, target: &str) -> Self {
        Self::with_kind(
            name,
            FieldKind::ForeignKey {
                target: target.to_string(),
            },
        )
    }

    #[must_use]
    pub fn structure(name: &str, kind: StructureKind) -> Self {
        Self {
            indexed: false,
            required: false,
            ..Self::with_kind(name, FieldKind::Structure(kind))
        }
    }

    #[must_use]
    pub fn list(name: &str) -> Self {
        Self::structure(name, StructureKind::List)
    }

    #[must_use]
    pub fn set(name: &str) -> Self {
        Self::structure(name, StructureKind::Set)
    }

    #[must_use]
    pub fn ordered_set(name: &str) -> Self {
        Self::structure(name, StructureKind::OrderedSet)
    }

    #[must_use]
    pub fn hash(name: &str) -> Self {
        Self::structure(name, StructureKind::Hash)
    }

    #[must_use]
    pub fn sorted_map(name: &str) -> Self {
        Self::structure(name, StructureKind::SortedMap)
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self.indexed = true;
        self
    }

    #[must_use]
    pub const fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    #[must_use]
    pub const fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self.required = true;
        self.indexed = true;
        self
    }

    /// Name of the reverse relation registered on the foreign-key target.
    #[must_use]
    pub fn related_name(mut self, name: &str) -> Self {
        self.related_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.indexed
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.ordered
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    #[must_use]
    pub fn related(&self) -> Option<&str> {
        self.related_name.as_deref()
    }

    /// Foreign-key target type name, if this field is a relation.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::ForeignKey { target } => Some(target),
            _ => None,
        }
    }

    #[must_use]
    pub const fn structure_kind(&self) -> Option<StructureKind> {
        match self.kind {
            FieldKind::Structure(kind) => Some(kind),
            _ => None,
        }
    }

    /// Hash value of `value` as used in this field's index keys.
    /// Relations hash to the target id; everything else to its index token.
    #[must_use]
    pub fn hash_value(&self, value: &Value) -> Option<String> {
        match self.kind {
            FieldKind::ForeignKey { .. } | FieldKind::Auto => value.id_token(),
            FieldKind::Structure(_) => None,
            _ => value.index_token(),
        }
    }
}
