//! Indexed property values.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of an indexed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Absent value.
    Null,
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Millisecond timestamp.
    Timestamp,
    /// Opaque bytes.
    Bytes,
}

impl ValueKind {
    /// Returns true if range queries are meaningful for this kind.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::Text | Self::Timestamp
        )
    }
}

/// A property value stored in a secondary index.
///
/// Values have a total order: first by kind, then by value within a kind.
/// Floats compare with [`f64::total_cmp`], so `NaN` sorts after every other
/// float and equals itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Millisecond timestamp.
    Timestamp(Timestamp),
    /// Opaque bytes.
    Bytes(Vec<u8>),
}

impl IndexValue {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Returns true if this value can bound a range query.
    #[must_use]
    pub fn is_orderable(&self) -> bool {
        self.kind().is_orderable()
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl Hash for IndexValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Integer(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Text(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for IndexValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for IndexValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for IndexValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Timestamp> for IndexValue {
    fn from(v: Timestamp) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<IndexValue>> From<Option<T>> for IndexValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn order_within_kind() {
        assert!(IndexValue::from(1) < IndexValue::from(2));
        assert!(IndexValue::from("apple") < IndexValue::from("banana"));
        assert!(IndexValue::from(-0.5) < IndexValue::from(0.25));
        assert!(IndexValue::Timestamp(Timestamp(1)) < IndexValue::Timestamp(Timestamp(2)));
    }

    #[test]
    fn order_across_kinds_is_by_kind() {
        assert!(IndexValue::Null < IndexValue::from(false));
        assert!(IndexValue::from(i64::MAX) < IndexValue::from(f64::MIN));
        assert!(IndexValue::from(f64::MAX) < IndexValue::from(""));
    }

    #[test]
    fn nan_is_self_equal() {
        let nan = IndexValue::from(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert!(IndexValue::from(f64::INFINITY) < nan);
    }

    #[test]
    fn hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(IndexValue::from(3));
        set.insert(IndexValue::from(3));
        set.insert(IndexValue::from(3.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn orderable_kinds() {
        assert!(IndexValue::from(1).is_orderable());
        assert!(IndexValue::from("x").is_orderable());
        assert!(!IndexValue::from(true).is_orderable());
        assert!(!IndexValue::Bytes(vec![1]).is_orderable());
        assert!(!IndexValue::Null.is_orderable());
    }

    #[test]
    fn option_conversion() {
        assert_eq!(IndexValue::from(None::<i64>), IndexValue::Null);
        assert_eq!(IndexValue::from(Some(4)), IndexValue::Integer(4));
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_string(&IndexValue::from(25)).unwrap();
        assert_eq!(json, r#"{"kind":"integer","value":25}"#);
        let back: IndexValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IndexValue::Integer(25));
    }
}
