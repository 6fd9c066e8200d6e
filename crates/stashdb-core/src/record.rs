//! Record instances.
//!
//! A [`Record`] pairs a shared, immutable [`RecordType`] with one value per
//! field, addressed by field position. Nothing on the instance duplicates
//! schema; accessors resolve names through the type's position table.

use crate::{
    db::keyspace::SEPARATOR,
    error::{ErrorOrigin, InternalError},
    model::{FieldKind, RecordType},
    serialize::{deserialize, serialize},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

///
/// IndexSnapshot
///
/// Index tokens of a record as last staged or loaded, keyed by field
/// position. Used to detect stale index memberships on update and to
/// clean up the exact entries a record registered on delete.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct IndexSnapshot {
    id: String,
    tokens: BTreeMap<usize, String>,
}

impl IndexSnapshot {
    pub(crate) const fn new(id: String, tokens: BTreeMap<usize, String>) -> Self {
        Self { id, tokens }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) const fn tokens(&self) -> &BTreeMap<usize, String> {
        &self.tokens
    }
}

///
/// Row
///
/// Encoded form of a record in the primary table: field name to value.
/// The primary key is the hash field, structure fields live under their
/// own keys and nulls are omitted.
///

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub(crate) struct Row(BTreeMap<String, Value>);

///
/// Record
///

#[derive(Clone)]
pub struct Record {
    record_type: Arc<RecordType>,
    values: Vec<Value>,
    snapshot: Option<IndexSnapshot>,
}

impl Record {
    #[must_use]
    pub fn new(record_type: &Arc<RecordType>) -> Self {
        Self {
            record_type: Arc::clone(record_type),
            values: vec![Value::Null; record_type.fields().len()],
            snapshot: None,
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self, InternalError> {
        self.set(field, value)?;

        Ok(self)
    }

    #[must_use]
    pub const fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.record_type.name()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record_type.position(field).map(|pos| &self.values[pos])
    }

    /// Set a field value, checking it against the field's kind.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), InternalError> {
        let Some(pos) = self.record_type.position(field) else {
            return Err(InternalError::field_constraint(
                ErrorOrigin::Record,
                format!("'{}' has no field '{field}'", self.type_name()),
            ));
        };
        let model = &self.record_type.fields()[pos];
        let value = normalize(model.kind(), value.into());
        if !model.kind().accepts(&value) {
            return Err(InternalError::field_constraint(
                ErrorOrigin::Record,
                format!(
                    "value {value} does not fit field '{field}' of '{}'",
                    self.type_name()
                ),
            ));
        }
        self.values[pos] = value;

        Ok(())
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Primary-key value; `Null` until assigned.
    #[must_use]
    pub fn id(&self) -> &Value {
        &self.values[self.record_type.primary_key_position()]
    }

    /// Primary key rendered as it appears in keys and index sets.
    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.id().id_token()
    }

    pub(crate) fn set_id(&mut self, id: Value) {
        let pos = self.record_type.primary_key_position();
        self.values[pos] = id;
    }

    /// Snapshot only if it was taken for the current id.
    pub(crate) fn snapshot_for_current_id(&self) -> Option<&IndexSnapshot> {
        let id = self.id_token()?;
        self.snapshot.as_ref().filter(|snap| snap.id() == id)
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: Option<IndexSnapshot>) {
        self.snapshot = snapshot;
    }

    /// Current index tokens of every indexed, non-null, non-primary field.
    pub(crate) fn index_tokens(&self) -> BTreeMap<usize, String> {
        self.record_type
            .indexed_fields()
            .filter_map(|(pos, field)| field.hash_value(&self.values[pos]).map(|t| (pos, t)))
            .collect()
    }

    /// Snapshot of the current index tokens, if the record has an id.
    pub(crate) fn take_snapshot(&self) -> Option<IndexSnapshot> {
        self.id_token()
            .map(|id| IndexSnapshot::new(id, self.index_tokens()))
    }

    /// Check everything that must hold before the record can be staged.
    pub(crate) fn validate(&self) -> Result<(), InternalError> {
        for (field, value) in self.record_type.fields().iter().zip(&self.values) {
            if field.is_required() && value.is_null() {
                return Err(InternalError::field_constraint(
                    ErrorOrigin::Record,
                    format!(
                        "field '{}' of '{}' is required",
                        field.name(),
                        self.type_name()
                    ),
                ));
            }

            let keyed = field.is_primary_key() || field.target().is_some();
            let token = if keyed { value.id_token() } else { None };
            if let Some(token) = token.filter(|t| t.is_empty() || t.contains(SEPARATOR)) {
                return Err(InternalError::field_constraint(
                    ErrorOrigin::Record,
                    format!(
                        "'{token}' is not a valid key for field '{}' of '{}'",
                        field.name(),
                        self.type_name()
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Encode the primary-table row.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, InternalError> {
        let row = self
            .record_type
            .fields()
            .iter()
            .zip(&self.values)
            .filter(|(field, value)| {
                !field.is_primary_key() && !field.kind().is_structure() && !value.is_null()
            })
            .map(|(field, value)| (field.name().to_string(), value.clone()))
            .collect();

        Ok(serialize(&Row(row))?)
    }

    /// Decode a primary-table row stored under `id`.
    ///
    /// Unknown field names are ignored; values that no longer fit their
    /// field are reported as corruption.
    pub(crate) fn decode(
        record_type: &Arc<RecordType>,
        id: &str,
        bytes: &[u8],
    ) -> Result<Self, InternalError> {
        let Row(row) = deserialize(bytes).map_err(|err| {
            InternalError::record_corruption(format!(
                "row '{id}' of '{}' is undecodable: {err}",
                record_type.name()
            ))
        })?;

        let mut record = Self::new(record_type);
        record.set_id(record_type.parse_id(id)?);
        for (name, value) in row {
            let Some(pos) = record_type.position(&name) else {
                continue;
            };
            if !record_type.fields()[pos].kind().accepts(&value) {
                return Err(InternalError::record_corruption(format!(
                    "row '{id}' of '{}' holds {value} in field '{name}'",
                    record_type.name()
                )));
            }
            record.values[pos] = value;
        }
        record.snapshot = record.take_snapshot();

        Ok(record)
    }
}

// Integer-keyed fields store signed values so that decoded ids compare
// equal to the ones staged.
fn normalize(kind: &FieldKind, value: Value) -> Value {
    match (kind, value) {
        (FieldKind::Auto | FieldKind::Integer | FieldKind::ForeignKey { .. }, Value::Uint(n)) => {
            i64::try_from(n).map_or(Value::Uint(n), Value::Int)
        }
        (_, value) => value,
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.record_type.name() == other.record_type.name() && self.values == other.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.record_type.fields().iter().zip(&self.values) {
            map.entry(&field.name(), value);
        }
        map.finish()
    }
}
