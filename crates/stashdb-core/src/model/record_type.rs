use crate::{
    db::keyspace::SEPARATOR,
    error::InternalError,
    model::field::{FieldKind, FieldModel},
    value::Value,
};
use convert_case::{Case, Casing};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Name of the primary-key field every record type carries.
pub const PRIMARY_KEY: &str = "id";

///
/// RecordType
///
/// Immutable record type descriptor: normalized name, ordered fields, an
/// optional namespace prefix and an optional time-to-live. Exactly one
/// field is the primary key and it is named `id`.
///

#[derive(Debug)]
pub struct RecordType {
    name: String,
    fields: Vec<FieldModel>,
    positions: HashMap<String, usize>,
    primary_key: usize,
    namespace: Option<String>,
    ttl: Option<Duration>,
}

impl RecordType {
    #[must_use]
    pub fn builder(name: &str) -> RecordTypeBuilder {
        RecordTypeBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldModel] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.position(name).map(|pos| &self.fields[pos])
    }

    /// Field position for the accessor table.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    #[must_use]
    pub fn primary_key(&self) -> &FieldModel {
        &self.fields[self.primary_key]
    }

    #[must_use]
    pub const fn primary_key_position(&self) -> usize {
        self.primary_key
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Indexed fields other than the primary key, with their positions.
    pub fn indexed_fields(&self) -> impl Iterator<Item = (usize, &FieldModel)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.indexed && !field.primary_key)
    }

    /// Structure-backed fields, with their positions.
    pub fn structure_fields(&self) -> impl Iterator<Item = (usize, &FieldModel)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.kind.is_structure())
    }

    /// Foreign-key fields, with their positions.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (usize, &FieldModel)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.target().is_some())
    }

    /// Parse a stored id token back into a primary-key value.
    pub fn parse_id(&self, token: &str) -> Result<Value, InternalError> {
        match self.primary_key().kind {
            FieldKind::Auto | FieldKind::Integer => token.parse::<i64>().map(Value::Int).map_err(|_| {
                InternalError::record_corruption(format!(
                    "id '{token}' of '{}' is not an integer",
                    self.name
                ))
            }),
            _ => Ok(Value::Text(token.to_string())),
        }
    }
}

///
/// RecordTypeBuilder
///
/// Explicit schema builder. Lists field descriptors and produces a shared,
/// immutable [`RecordType`].
///

#[derive(Debug)]
pub struct RecordTypeBuilder {
    name: String,
    fields: Vec<FieldModel>,
    namespace: Option<String>,
    ttl: Option<Duration>,
}

impl RecordTypeBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            namespace: None,
            ttl: None,
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

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

    pub fn build(self) -> Result<Arc<RecordType>, InternalError> {
        let name = normalize_type_name(&self.name)?;
        if let Some(ns) = &self.namespace {
            reject_separator("namespace", ns)?;
        }

        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        if !self.fields.iter().any(|f| f.name == PRIMARY_KEY) {
            fields.push(FieldModel::auto(PRIMARY_KEY));
        }

        for field in self.fields {
            fields.push(validate_field(&name, field)?);
        }

        let mut positions = HashMap::with_capacity(fields.len());
        for (pos, field) in fields.iter().enumerate() {
            if positions.insert(field.name.clone(), pos).is_some() {
                return Err(InternalError::invalid_schema(format!(
                    "duplicate field '{}' in '{name}'",
                    field.name
                )));
            }
        }

        let primary_key = positions[PRIMARY_KEY];

        Ok(Arc::new(RecordType {
            name,
            fields,
            positions,
            primary_key,
            namespace: self.namespace,
            ttl: self.ttl.filter(|ttl| !ttl.is_zero()),
        }))
    }
}

/// Normalize a declared type name to the snake-case name used in keys.
pub(crate) fn normalize_type_name(name: &str) -> Result<String, InternalError> {
    let normalized = name.to_case(Case::Snake);
    if normalized.is_empty() {
        return Err(InternalError::invalid_schema("record type name is empty"));
    }
    reject_separator("record type name", &normalized)?;

    Ok(normalized)
}

fn reject_separator(what: &str, text: &str) -> Result<(), InternalError> {
    if text.contains(SEPARATOR) {
        return Err(InternalError::invalid_schema(format!(
            "{what} '{text}' contains the key separator '{SEPARATOR}'"
        )));
    }

    Ok(())
}

// Enforce attribute invariants on one declared field.
fn validate_field(type_name: &str, mut field: FieldModel) -> Result<FieldModel, InternalError> {
    if field.name.is_empty() {
        return Err(InternalError::invalid_schema(format!(
            "empty field name in '{type_name}'"
        )));
    }
    reject_separator("field name", &field.name)?;

    if field.name == PRIMARY_KEY && !field.primary_key {
        return Err(InternalError::invalid_schema(format!(
            "field '{PRIMARY_KEY}' of '{type_name}' must be the primary key"
        )));
    }
    if field.primary_key {
        if field.name != PRIMARY_KEY {
            return Err(InternalError::invalid_schema(format!(
                "primary key of '{type_name}' must be named '{PRIMARY_KEY}', found '{}'",
                field.name
            )));
        }
        if !matches!(
            field.kind,
            FieldKind::Auto | FieldKind::Integer | FieldKind::Symbol
        ) {
            return Err(InternalError::invalid_schema(format!(
                "primary key of '{type_name}' must be an integer or symbol"
            )));
        }
    }

    match field.kind {
        FieldKind::Structure(kind) => {
            if field.indexed || field.unique || field.primary_key {
                return Err(InternalError::invalid_schema(format!(
                    "{kind} field '{}' of '{type_name}' cannot be indexed",
                    field.name
                )));
            }
            field.required = false;
        }
        FieldKind::Text if field.indexed => {
            return Err(InternalError::invalid_schema(format!(
                "text field '{}' of '{type_name}' cannot be indexed; declare it as a symbol",
                field.name
            )));
        }
        FieldKind::ForeignKey { ref target } => {
            let target = normalize_type_name(target)?;
            field.kind = FieldKind::ForeignKey { target };
            field.indexed = true;
            if let Some(related) = &field.related_name {
                reject_separator("related name", related)?;
            }
        }
        _ => {}
    }

    if field.unique {
        field.indexed = true;
        field.ordered = false;
    }

    Ok(field)
}
