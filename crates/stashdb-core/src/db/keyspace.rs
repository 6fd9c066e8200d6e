//! Deterministic key construction.
//!
//! Layout:
//! - `<prefix><type>`                      primary hash table
//! - `<prefix><type>:ids`                  primary-key counter
//! - `<prefix><type>:<field>:<hash>`       index set or unique pointer
//! - `<prefix><type>:id:<id>:<field>`      structure-backed field of one record
//!
//! No escaping is performed. Field names, namespaces and textual ids must
//! not contain [`SEPARATOR`]; the schema builder and the stager reject them.

use std::fmt::{Display, Write};

/// Separator between key parts.
pub const SEPARATOR: char = ':';

/// Default prefix applied when neither the registration nor the record
/// type names a namespace.
pub const DEFAULT_PREFIX: &str = "stash.";

const COUNTER_PART: &str = "ids";
const RECORD_PART: &str = "id";

///
/// KeySpace
///
/// Key builder bound to one record type and its namespace prefix.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeySpace {
    base: String,
}

impl KeySpace {
    #[must_use]
    pub fn new(prefix: &str, type_name: &str) -> Self {
        Self {
            base: format!("{prefix}{type_name}"),
        }
    }

    /// `prefix + type_name`, followed by each part in call order.
    #[must_use]
    pub fn basekey(&self, parts: &[&dyn Display]) -> String {
        let mut key = self.base.clone();
        for part in parts {
            // Writing into a String cannot fail.
            let _ = write!(key, "{SEPARATOR}{part}");
        }

        key
    }

    /// Primary hash table key.
    #[must_use]
    pub fn table(&self) -> String {
        self.base.clone()
    }

    /// Auto-increment counter key.
    #[must_use]
    pub fn counter(&self) -> String {
        self.basekey(&[&COUNTER_PART])
    }

    /// Index key for one field value (set or unique pointer).
    #[must_use]
    pub fn index(&self, field: &str, hash: &str) -> String {
        self.basekey(&[&field, &hash])
    }

    /// Key of a record's own structure-backed field.
    #[must_use]
    pub fn structure(&self, id: &str, field: &str) -> String {
        self.basekey(&[&RECORD_PART, &id, &field])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_matches_documented_shapes() {
        let ks = KeySpace::new("stash.", "instrument");

        assert_eq!(ks.table(), "stash.instrument");
        assert_eq!(ks.counter(), "stash.instrument:ids");
        assert_eq!(ks.index("ccy", "abc"), "stash.instrument:ccy:abc");
        assert_eq!(ks.structure("7", "prices"), "stash.instrument:id:7:prices");
    }

    #[test]
    fn basekey_appends_parts_in_call_order() {
        let ks = KeySpace::new("", "fund");

        assert_eq!(ks.basekey(&[]), "fund");
        assert_eq!(ks.basekey(&[&"a", &1, &"b"]), "fund:a:1:b");
    }

    fn part() -> impl Strategy<Value = String> {
        "[a-z0-9_.]{1,6}"
    }

    proptest! {
        #[test]
        fn index_keys_are_injective(
            t1 in part(), f1 in part(), h1 in part(),
            t2 in part(), f2 in part(), h2 in part(),
        ) {
            prop_assume!((&t1, &f1, &h1) != (&t2, &f2, &h2));
            let a = KeySpace::new("p.", &t1).index(&f1, &h1);
            let b = KeySpace::new("p.", &t2).index(&f2, &h2);
            prop_assert_ne!(a, b);
        }
    }
}
