#[cfg(test)]
mod tests;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::Date;
use xxhash_rust::xxh3::xxh3_64;

///
/// Value
///
/// Dynamic field value held by a record and carried through staging,
/// index hashing and row encoding. `Null` marks an unset field.
///

#[derive(Clone, Debug, Default, Deserialize, Display, PartialEq, Serialize)]
pub enum Value {
    #[default]
    #[display("null")]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Date(Date),
    #[display("@{_0}")]
    Timestamp(i64),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) | Self::Timestamp(n) => Some(*n),
            Self::Uint(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Token used when this value identifies a record (primary or foreign key).
    /// Integers render in decimal, text is used verbatim.
    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        match self {
            Self::Int(n) => Some(n.to_string()),
            Self::Uint(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Token used as an index-key suffix.
    ///
    /// Text hashes to an opaque fixed-width token, numbers render as
    /// themselves, booleans as `1`/`0`, dates as the unix timestamp of UTC
    /// midnight. `Null` is not indexable.
    #[must_use]
    pub fn index_token(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Int(n) | Self::Timestamp(n) => Some(n.to_string()),
            Self::Uint(n) => Some(n.to_string()),
            // -0.0 and 0.0 compare equal and share a token.
            Self::Float(f) => {
                let f = if *f == 0.0 { 0.0 } else { *f };
                Some(f.to_string())
            }
            Self::Text(s) => Some(text_token(s)),
            Self::Date(d) => Some(date_timestamp(*d).to_string()),
        }
    }
}

/// Opaque hash token for a text value.
#[must_use]
pub fn text_token(text: &str) -> String {
    format!("{:016x}", xxh3_64(text.as_bytes()))
}

/// Unix timestamp (seconds) of UTC midnight for a date.
#[must_use]
pub fn date_timestamp(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Uint(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
