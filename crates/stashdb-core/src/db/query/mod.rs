//! Query resolver.
//!
//! A query is a conjunction of `field = value` filters plus optional
//! `field != value` exclusions. Resolution order:
//! 1. a primary-key filter answers directly from the primary table
//! 2. else the first unique filter follows its pointer
//! 3. else every filter names an index set and the sets are intersected
//! 4. no filters at all means every record of the type
//!
//! Filters are validated before any store command is issued. Exclusions
//! are applied client-side as a set difference over the resolved ids.


use crate::{
    db::{Db, registry::Registration},
    error::{ErrorOrigin, InternalError},
    model::{FieldModel, RecordType},
    obs::sink::{self, MetricsEvent, PlanKind},
    record::Record,
    value::Value,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, warn};

///
/// Resolution
///
/// Outcome of resolving the filters, before records are fetched.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Resolution {
    PrimaryKey(String),
    Unique(Option<String>),
    Ids(Vec<String>),
    All,
}

impl Resolution {
    const fn plan(&self) -> PlanKind {
        match self {
            Self::PrimaryKey(_) => PlanKind::PrimaryKey,
            Self::Unique(_) => PlanKind::Unique,
            Self::Ids(_) => PlanKind::Intersect,
            Self::All => PlanKind::All,
        }
    }
}

// One validated constraint: the field, its position and the hash token
// (id token for the primary key).
#[derive(Debug)]
struct Constraint {
    pos: usize,
    token: String,
}

///
/// Query
///
/// Filter builder over one registered record type.
///

#[derive(Debug)]
pub struct Query<'a> {
    db: &'a Db,
    registration: Arc<Registration>,
    filters: Vec<(String, Value)>,
    excludes: Vec<(String, Value)>,
}

impl<'a> Query<'a> {
    pub(crate) const fn new(db: &'a Db, registration: Arc<Registration>) -> Self {
        Self {
            db,
            registration,
            filters: Vec::new(),
            excludes: Vec::new(),
        }
    }

    /// Keep records whose `field` equals `value`.
    #[must_use]
    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    /// Drop records whose `field` equals `value`.
    #[must_use]
    pub fn exclude(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.excludes.push((field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn record_type(&self) -> &Arc<RecordType> {
        self.registration.record_type()
    }

    /// Every matching record, ordered by id.
    pub fn all(&self) -> Result<Vec<Record>, InternalError> {
        self.db.with_metrics(|| self.execute())
    }

    /// The single matching record. Zero or several matches fail with
    /// an ambiguous-result error.
    pub fn get(&self) -> Result<Record, InternalError> {
        let mut records = self.all()?;
        match records.len() {
            1 => Ok(records.remove(0)),
            n => Err(InternalError::ambiguous(format!(
                "expected exactly one '{}', found {n}",
                self.record_type().name()
            ))),
        }
    }

    /// The first matching record by id, if any.
    pub fn first(&self) -> Result<Option<Record>, InternalError> {
        Ok(self.all()?.into_iter().next())
    }

    /// Matching ids, ordered, without fetching rows.
    pub fn ids(&self) -> Result<Vec<Value>, InternalError> {
        self.db.with_metrics(|| {
            let ids = self.resolve_ids()?;
            ids.iter()
                .map(|id| self.record_type().parse_id(id))
                .collect()
        })
    }

    pub fn count(&self) -> Result<u64, InternalError> {
        self.db.with_metrics(|| {
            let reg = &self.registration;
            if self.filters.is_empty() && self.excludes.is_empty() {
                return Ok(reg.client().hlen(&reg.keyspace().table())?);
            }

            Ok(self.resolve_ids()?.len() as u64)
        })
    }

    // Validate both constraint lists, resolve filters, then collect the
    // excluded ids.
    fn prepare(&self) -> Result<(Resolution, BTreeSet<String>), InternalError> {
        let filters = self.validate(&self.filters)?;
        let excludes = self.validate(&self.excludes)?;
        let resolution = self.resolve(&filters)?;
        let excluded = self.excluded_ids(excludes)?;

        Ok((resolution, excluded))
    }

    fn execute(&self) -> Result<Vec<Record>, InternalError> {
        let reg = &self.registration;
        let record_type = reg.record_type();
        let table = reg.keyspace().table();
        let (resolution, excluded) = self.prepare()?;
        let plan = resolution.plan();

        let mut rows = match resolution {
            Resolution::PrimaryKey(id) | Resolution::Unique(Some(id)) => {
                match reg.client().hget(&table, &id)? {
                    Some(bytes) => vec![(id, bytes)],
                    None => {
                        if plan == PlanKind::Unique {
                            warn!(
                                record_type = record_type.name(),
                                id = %id,
                                "unique pointer references a missing record"
                            );
                        }
                        Vec::new()
                    }
                }
            }
            Resolution::Unique(None) => Vec::new(),
            Resolution::Ids(ids) => {
                let ids = ids
                    .into_iter()
                    .filter(|id| !excluded.contains(id))
                    .collect::<Vec<_>>();
                if ids.is_empty() {
                    Vec::new()
                } else {
                    let fetched = reg.client().hmget(&table, &ids)?;
                    ids.into_iter()
                        .zip(fetched)
                        .filter_map(|(id, bytes)| bytes.map(|b| (id, b)))
                        .collect()
                }
            }
            Resolution::All => reg.client().hgetall(&table)?,
        };
        rows.retain(|(id, _)| !excluded.contains(id));
        sort_ids_by(&mut rows, |(id, _)| id);

        let records = rows
            .iter()
            .map(|(id, bytes)| Record::decode(record_type, id, bytes))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            record_type = record_type.name(),
            plan = ?plan,
            rows = records.len(),
            "query resolved"
        );
        sink::record(MetricsEvent::Query {
            type_name: record_type.name(),
            plan,
            rows: records.len() as u64,
        });

        Ok(records)
    }

    // Ids only; rows are touched just to confirm direct lookups exist.
    fn resolve_ids(&self) -> Result<Vec<String>, InternalError> {
        let reg = &self.registration;
        let table = reg.keyspace().table();
        let (resolution, excluded) = self.prepare()?;

        let mut ids = match resolution {
            Resolution::PrimaryKey(id) | Resolution::Unique(Some(id)) => {
                if reg.client().hget(&table, &id)?.is_some() {
                    vec![id]
                } else {
                    Vec::new()
                }
            }
            Resolution::Unique(None) => Vec::new(),
            Resolution::Ids(ids) => ids,
            Resolution::All => reg.client().hkeys(&table)?,
        };
        ids.retain(|id| !excluded.contains(id));
        sort_ids_by(&mut ids, |id| id);

        Ok(ids)
    }

    /// Decide how to answer validated filters.
    fn resolve(&self, filters: &[Constraint]) -> Result<Resolution, InternalError> {
        let record_type = self.record_type();
        let fields = record_type.fields();

        if let Some(c) = filters.iter().find(|c| fields[c.pos].is_primary_key()) {
            return Ok(Resolution::PrimaryKey(c.token.clone()));
        }

        let reg = &self.registration;
        if let Some(c) = filters.iter().find(|c| fields[c.pos].is_unique()) {
            let key = reg.keyspace().index(fields[c.pos].name(), &c.token);
            let id = reg
                .client()
                .get(&key)?
                .map(|bytes| pointer_id(&key, bytes))
                .transpose()?;

            return Ok(Resolution::Unique(id));
        }

        if filters.is_empty() {
            return Ok(Resolution::All);
        }

        let keys = filters
            .iter()
            .map(|c| reg.keyspace().index(fields[c.pos].name(), &c.token))
            .collect::<Vec<_>>();
        let ids = reg
            .client()
            .sinter(&keys)?
            .into_iter()
            .map(|bytes| String::from_utf8(bytes).map_err(|_| corrupt_member(&keys)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Resolution::Ids(ids))
    }

    // Union of every id an exclusion matches.
    fn excluded_ids(&self, excludes: Vec<Constraint>) -> Result<BTreeSet<String>, InternalError> {
        let fields = self.record_type().fields();
        let reg = &self.registration;

        let mut excluded = BTreeSet::new();
        for c in excludes {
            let field = &fields[c.pos];
            if field.is_primary_key() {
                excluded.insert(c.token);
                continue;
            }

            let key = reg.keyspace().index(field.name(), &c.token);
            if field.is_unique() {
                if let Some(bytes) = reg.client().get(&key)? {
                    excluded.insert(pointer_id(&key, bytes)?);
                }
            } else {
                for bytes in reg.client().smembers(&key)? {
                    let id = String::from_utf8(bytes)
                        .map_err(|_| corrupt_member(std::slice::from_ref(&key)))?;
                    excluded.insert(id);
                }
            }
        }

        Ok(excluded)
    }

    // Pure validation: every constraint names an indexed field and a
    // value that can be hashed into an index key.
    fn validate(&self, constraints: &[(String, Value)]) -> Result<Vec<Constraint>, InternalError> {
        let record_type = self.record_type();
        constraints
            .iter()
            .map(|(name, value)| {
                let Some(pos) = record_type.position(name) else {
                    return Err(InternalError::field_constraint(
                        ErrorOrigin::Query,
                        format!("'{}' has no field '{name}'", record_type.name()),
                    ));
                };
                let field = &record_type.fields()[pos];
                check_filterable(record_type, field, value)?;

                let token = if field.is_primary_key() {
                    value.id_token()
                } else {
                    field.hash_value(value)
                };
                let token = token.ok_or_else(|| {
                    InternalError::field_constraint(
                        ErrorOrigin::Query,
                        format!(
                            "{value} cannot be matched against field '{name}' of '{}'",
                            record_type.name()
                        ),
                    )
                })?;

                Ok(Constraint { pos, token })
            })
            .collect()
    }
}

fn check_filterable(
    record_type: &RecordType,
    field: &FieldModel,
    value: &Value,
) -> Result<(), InternalError> {
    if !field.is_indexed() {
        return Err(InternalError::field_constraint(
            ErrorOrigin::Query,
            format!(
                "field '{}' of '{}' is not indexed and cannot be filtered",
                field.name(),
                record_type.name()
            ),
        ));
    }
    if value.is_null() || !field.kind().accepts(value) {
        return Err(InternalError::field_constraint(
            ErrorOrigin::Query,
            format!(
                "{value} cannot be matched against field '{}' of '{}'",
                field.name(),
                record_type.name()
            ),
        ));
    }

    Ok(())
}

fn pointer_id(key: &str, bytes: Vec<u8>) -> Result<String, InternalError> {
    String::from_utf8(bytes)
        .map_err(|_| InternalError::index_corruption(format!("unique pointer '{key}' is not an id")))
}

fn corrupt_member(keys: &[String]) -> InternalError {
    InternalError::index_corruption(format!("index {keys:?} holds a member that is not an id"))
}

// Integer ids sort numerically, textual ids lexically after them.
fn sort_ids_by<T>(items: &mut [T], id: impl Fn(&T) -> &String) {
    items.sort_by(|a, b| {
        let (a, b) = (id(a), id(b));
        match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        }
    });
}
