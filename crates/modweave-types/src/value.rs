//! Typed attribute values carried by capabilities.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// A typed capability attribute value.
///
/// Filters compare values type-aware: a `version` comparison parses the
/// filter operand as a [`Version`], an `Int` comparison parses it as an
/// integer, and string comparisons are lexical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    Version(Version),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Value::Version(v) => Some(v),
            _ => None,
        }
    }

    /// Compare this value against a raw filter operand.
    ///
    /// Returns `None` when the operand does not parse as this value's type
    /// (such comparisons never match).
    pub fn compare_to_operand(&self, operand: &str) -> Option<Ordering> {
        match self {
            Value::Str(s) => Some(s.as_str().cmp(operand)),
            Value::Int(i) => operand.parse::<i64>().ok().map(|o| i.cmp(&o)),
            Value::Bool(b) => operand.parse::<bool>().ok().map(|o| b.cmp(&o)),
            Value::Version(v) => operand.parse::<Version>().ok().map(|o| v.cmp(&o)),
            Value::List(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Version(v) => write!(f, "{v}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", rendered.join(","))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Version> for Value {
    fn from(v: Version) -> Self {
        Value::Version(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_to_operand() {
        assert_eq!(
            Value::Int(5).compare_to_operand("5"),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Int(5).compare_to_operand("7"),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(5).compare_to_operand("abc"), None);
        assert_eq!(
            Value::Version("1.2.0".parse().unwrap()).compare_to_operand("1.10"),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Str("b".into()).compare_to_operand("a"),
            Some(Ordering::Greater)
        );
    }
}
