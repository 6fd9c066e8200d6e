use crate::{db::registry::RegistryError, error::InternalError, model::RecordType};
use std::collections::BTreeMap;

///
/// RelationEdge
///
/// Owning side of a one-to-many relation: the source type and the
/// foreign-key field on it that points at the target.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RelationEdge {
    pub(crate) source: String,
    pub(crate) field: String,
}

///
/// RelationTable
///
/// Directed reverse-relation table keyed by `(target_type, related_name)`.
/// Holds names only; the owning type is resolved through the registry
/// when a relation is followed.
///

#[derive(Debug, Default)]
pub(crate) struct RelationTable {
    edges: BTreeMap<(String, String), RelationEdge>,
}

impl RelationTable {
    /// Default reverse name for a relation declared on `source`.
    #[must_use]
    pub(crate) fn default_related_name(source: &str) -> String {
        format!("{source}_set")
    }

    /// Record every foreign key declared on `source`. All-or-nothing:
    /// a conflicting name leaves the table unchanged.
    pub(crate) fn register(&mut self, source: &RecordType) -> Result<(), InternalError> {
        let mut staged: Vec<((String, String), RelationEdge)> = Vec::new();
        for (_, field) in source.foreign_keys() {
            let Some(target) = field.target() else {
                continue;
            };
            let related = field
                .related()
                .map_or_else(|| Self::default_related_name(source.name()), str::to_string);
            let key = (target.to_string(), related);
            let edge = RelationEdge {
                source: source.name().to_string(),
                field: field.name().to_string(),
            };

            let taken = self
                .edges
                .get(&key)
                .or_else(|| staged.iter().find(|(k, _)| *k == key).map(|(_, e)| e));
            if let Some(existing) = taken.filter(|existing| **existing != edge) {
                return Err(RegistryError::RelationConflict {
                    target: key.0,
                    related: key.1,
                    owner: format!("{}.{}", existing.source, existing.field),
                }
                .into());
            }
            staged.push((key, edge));
        }
        self.edges.extend(staged);

        Ok(())
    }

    pub(crate) fn resolve(&self, target: &str, related: &str) -> Option<&RelationEdge> {
        self.edges.get(&(target.to_string(), related.to_string()))
    }

    pub(crate) fn clear(&mut self) {
        self.edges.clear();
    }
}
