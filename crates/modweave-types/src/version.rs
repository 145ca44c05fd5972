//! Module and capability versions.
//!
//! Versions follow the `major.minor.micro[.qualifier]` scheme. The numeric
//! segments compare numerically, the qualifier compares lexically, and an
//! absent qualifier sorts before any present one (`1.0.0 < 1.0.0.beta`).
//!
//! [`VersionRange`] is the interval form used by requirements:
//! `[1.0,2.0)` (closed/open bounds) or a bare version meaning "at least".

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::filter::Filter;

/// Error produced when parsing a [`Version`] or [`VersionRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version segment '{0}'")]
    InvalidSegment(String),
    #[error("version '{0}' has too many segments")]
    TooManySegments(String),
    #[error("empty version string")]
    Empty,
    #[error("invalid version range '{0}'")]
    InvalidRange(String),
}

/// A `major.minor.micro[.qualifier]` version with total order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    micro: u32,
    qualifier: String,
}

impl Version {
    /// The `0.0.0` version, used when a capability carries no version
    /// attribute.
    pub const EMPTY: Version = Version {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
    };

    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Version {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(major: u32, minor: u32, micro: u32, qualifier: &str) -> Self {
        Version {
            major,
            minor,
            micro,
            qualifier: qualifier.to_string(),
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn micro(&self) -> u32 {
        self.micro
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut parts = s.splitn(4, '.');
        let mut numeric = |part: Option<&str>| -> Result<u32, VersionError> {
            match part {
                None => Ok(0),
                Some(p) => p
                    .parse::<u32>()
                    .map_err(|_| VersionError::InvalidSegment(p.to_string())),
            }
        };
        let major = numeric(parts.next())?;
        let minor = numeric(parts.next())?;
        let micro = numeric(parts.next())?;
        let qualifier = parts.next().unwrap_or("").to_string();
        Ok(Version {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A version interval with open or closed bounds.
///
/// Syntax: `[min,max)`, `(min,max]`, `[min,max]`, `(min,max)`, or a bare
/// version `min` which is shorthand for `[min,∞)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    min: Version,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
}

impl VersionRange {
    /// `[min,∞)`.
    pub fn at_least(min: Version) -> Self {
        VersionRange {
            min,
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    pub fn new(min: Version, min_inclusive: bool, max: Option<Version>, max_inclusive: bool) -> Self {
        VersionRange {
            min,
            min_inclusive,
            max,
            max_inclusive,
        }
    }

    pub fn includes(&self, version: &Version) -> bool {
        let lower_ok = if self.min_inclusive {
            *version >= self.min
        } else {
            *version > self.min
        };
        if !lower_ok {
            return false;
        }
        match &self.max {
            None => true,
            Some(max) => {
                if self.max_inclusive {
                    version <= max
                } else {
                    version < max
                }
            }
        }
    }

    /// Render this range as a [`Filter`] over the given version attribute.
    ///
    /// This is how ranges are carried by requirements: `[1.0,2.0)` on the
    /// `version` attribute becomes `(&(version>=1.0.0)(!(version>=2.0.0)))`.
    pub fn to_filter(&self, attr: &str) -> Filter {
        let mut clauses = Vec::new();
        let min = self.min.to_string();
        if self.min_inclusive {
            clauses.push(Filter::greater_eq(attr, &min));
        } else {
            clauses.push(Filter::greater_eq(attr, &min));
            clauses.push(Filter::not(Filter::equal(attr, &min)));
        }
        if let Some(max) = &self.max {
            let max = max.to_string();
            if self.max_inclusive {
                clauses.push(Filter::less_eq(attr, &max));
            } else {
                clauses.push(Filter::not(Filter::greater_eq(attr, &max)));
            }
        }
        if clauses.len() == 1 {
            clauses.pop().unwrap_or_else(|| Filter::present(attr))
        } else {
            Filter::and(clauses)
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let first = s.chars().next().unwrap_or(' ');
        if first != '[' && first != '(' {
            // Bare version: at-least.
            return Ok(VersionRange::at_least(s.parse()?));
        }
        let min_inclusive = first == '[';
        let last = s.chars().last().unwrap_or(' ');
        if last != ']' && last != ')' {
            return Err(VersionError::InvalidRange(s.to_string()));
        }
        let max_inclusive = last == ']';
        let inner = &s[1..s.len() - 1];
        let mut parts = inner.splitn(2, ',');
        let min = parts
            .next()
            .ok_or_else(|| VersionError::InvalidRange(s.to_string()))?
            .trim()
            .parse()?;
        let max = match parts.next() {
            None => return Err(VersionError::InvalidRange(s.to_string())),
            Some(m) => m.trim().parse()?,
        };
        Ok(VersionRange {
            min,
            min_inclusive,
            max: Some(max),
            max_inclusive,
        })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.max {
            None => write!(f, "{}", self.min),
            Some(max) => write!(
                f,
                "{}{},{}{}",
                if self.min_inclusive { '[' } else { '(' },
                self.min,
                max,
                if self.max_inclusive { ']' } else { ')' },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert_eq!(v("1.2").to_string(), "1.2.0");
        assert_eq!(v("2").to_string(), "2.0.0");
        assert_eq!(v("1.2.3.beta").to_string(), "1.2.3.beta");
        assert!("1.x".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(v("2.0.0") > v("1.9.9"));
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("1.0.0.beta") > v("1.0.0"));
        assert!(v("1.0.0.a") < v("1.0.0.b"));
        assert_eq!(v("1.0"), v("1.0.0"));
    }

    #[test]
    fn test_range_includes() {
        let range: VersionRange = "[1.0,2.0)".parse().unwrap();
        assert!(range.includes(&v("1.0.0")));
        assert!(range.includes(&v("1.9.9")));
        assert!(!range.includes(&v("2.0.0")));
        assert!(!range.includes(&v("0.9.0")));

        let open: VersionRange = "(1.0,2.0]".parse().unwrap();
        assert!(!open.includes(&v("1.0.0")));
        assert!(open.includes(&v("2.0.0")));

        let at_least: VersionRange = "1.5".parse().unwrap();
        assert!(at_least.includes(&v("99.0.0")));
        assert!(!at_least.includes(&v("1.4.9")));
    }

    #[test]
    fn test_range_to_filter() {
        use std::collections::BTreeMap;

        let range: VersionRange = "[1.0,2.0)".parse().unwrap();
        let filter = range.to_filter("version");
        let mut attrs = BTreeMap::new();
        attrs.insert("version".to_string(), crate::Value::Version(v("1.5.0")));
        assert!(filter.matches(&attrs));
        attrs.insert("version".to_string(), crate::Value::Version(v("2.0.0")));
        assert!(!filter.matches(&attrs));
    }

    #[test]
    fn test_bad_ranges() {
        assert!("[1.0".parse::<VersionRange>().is_err());
        assert!("[1.0]".parse::<VersionRange>().is_err());
        assert!("[a,b]".parse::<VersionRange>().is_err());
    }
}
