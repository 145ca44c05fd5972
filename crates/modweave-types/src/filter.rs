//! Attribute-match filter expressions.
//!
//! Requirements select capabilities with a parenthesized prefix syntax over
//! the capability's attribute map:
//!
//! ```text
//! (package=util.text)
//! (&(package=util.text)(version>=1.0.0)(!(version>=2.0.0)))
//! (|(ee=java)(ee=wasm))
//! (name=util.*)
//! (version=*)
//! ```
//!
//! Supported operators are `=`, `>=`, `<=`, presence (`=*`) and trailing or
//! embedded `*` wildcards on string equality. Comparisons are type-aware
//! through [`Value::compare_to_operand`]. Filters are parsed once at
//! construction; evaluation allocates nothing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::value::Value;

/// Error produced when parsing a [`Filter`] expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unexpected end of filter at position {0}")]
    UnexpectedEnd(usize),
    #[error("expected '{expected}' at position {position}")]
    Expected { expected: char, position: usize },
    #[error("empty attribute name at position {0}")]
    EmptyAttribute(usize),
    #[error("missing operator in component at position {0}")]
    MissingOperator(usize),
    #[error("trailing input after filter at position {0}")]
    TrailingInput(usize),
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `=` comparison; a `*` in the operand makes this a wildcard match on
    /// string values, and a bare `*` operand tests attribute presence.
    Equal { attr: String, operand: String },
    GreaterEq { attr: String, operand: String },
    LessEq { attr: String, operand: String },
}

impl Filter {
    pub fn and(clauses: Vec<Filter>) -> Filter {
        Filter::And(clauses)
    }

    pub fn or(clauses: Vec<Filter>) -> Filter {
        Filter::Or(clauses)
    }

    pub fn not(inner: Filter) -> Filter {
        Filter::Not(Box::new(inner))
    }

    pub fn equal(attr: &str, operand: &str) -> Filter {
        Filter::Equal {
            attr: attr.to_string(),
            operand: operand.to_string(),
        }
    }

    pub fn greater_eq(attr: &str, operand: &str) -> Filter {
        Filter::GreaterEq {
            attr: attr.to_string(),
            operand: operand.to_string(),
        }
    }

    pub fn less_eq(attr: &str, operand: &str) -> Filter {
        Filter::LessEq {
            attr: attr.to_string(),
            operand: operand.to_string(),
        }
    }

    pub fn present(attr: &str) -> Filter {
        Filter::equal(attr, "*")
    }

    /// Evaluate this filter against an attribute map.
    pub fn matches(&self, attributes: &BTreeMap<String, Value>) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(attributes)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(attributes)),
            Filter::Not(inner) => !inner.matches(attributes),
            Filter::Equal { attr, operand } => match attributes.get(attr) {
                None => false,
                Some(_) if operand == "*" => true,
                Some(value) => equal_match(value, operand),
            },
            Filter::GreaterEq { attr, operand } => attributes
                .get(attr)
                .and_then(|v| v.compare_to_operand(operand))
                .map(|o| o.is_ge())
                .unwrap_or(false),
            Filter::LessEq { attr, operand } => attributes
                .get(attr)
                .and_then(|v| v.compare_to_operand(operand))
                .map(|o| o.is_le())
                .unwrap_or(false),
        }
    }
}

fn equal_match(value: &Value, operand: &str) -> bool {
    match value {
        Value::Str(s) if operand.contains('*') => wildcard_match(s, operand),
        Value::List(items) => items.iter().any(|item| equal_match(item, operand)),
        _ => value
            .compare_to_operand(operand)
            .map(|o| o.is_eq())
            .unwrap_or(false),
    }
}

/// Match `text` against a pattern containing `*` wildcards.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut remaining = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            // Pattern does not start with '*': anchored prefix.
            match remaining.strip_prefix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            // Pattern does not end with '*': anchored suffix.
            match remaining.strip_suffix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else {
            match remaining.find(part) {
                Some(pos) => remaining = &remaining[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        let mut parser = Parser { bytes, pos: 0 };
        let filter = parser.parse_filter()?;
        if parser.pos != bytes.len() {
            return Err(FilterError::TrailingInput(parser.pos));
        }
        Ok(filter)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<(), FilterError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(FilterError::Expected {
                expected: expected as char,
                position: self.pos,
            }),
            None => Err(FilterError::UnexpectedEnd(self.pos)),
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_clause_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_clause_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_component()?,
            None => return Err(FilterError::UnexpectedEnd(self.pos)),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_clause_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut clauses = Vec::new();
        while self.peek() == Some(b'(') {
            clauses.push(self.parse_filter()?);
        }
        Ok(clauses)
    }

    fn parse_component(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        let mut attr_end = None;
        let mut op = None;
        while let Some(b) = self.peek() {
            match b {
                b'>' | b'<' => {
                    attr_end = Some(self.pos);
                    self.pos += 1;
                    self.expect(b'=')?;
                    op = Some(if b == b'>' { Op::GreaterEq } else { Op::LessEq });
                    break;
                }
                b'=' => {
                    attr_end = Some(self.pos);
                    self.pos += 1;
                    op = Some(Op::Equal);
                    break;
                }
                b')' => break,
                _ => self.pos += 1,
            }
        }
        let (attr_end, op) = match (attr_end, op) {
            (Some(e), Some(o)) => (e, o),
            _ => return Err(FilterError::MissingOperator(start)),
        };
        let attr = std::str::from_utf8(&self.bytes[start..attr_end])
            .unwrap_or("")
            .trim()
            .to_string();
        if attr.is_empty() {
            return Err(FilterError::EmptyAttribute(start));
        }
        let value_start = self.pos;
        while let Some(b) = self.peek() {
            if b == b')' {
                break;
            }
            self.pos += 1;
        }
        let operand = std::str::from_utf8(&self.bytes[value_start..self.pos])
            .unwrap_or("")
            .to_string();
        Ok(match op {
            Op::Equal => Filter::Equal { attr, operand },
            Op::GreaterEq => Filter::GreaterEq { attr, operand },
            Op::LessEq => Filter::LessEq { attr, operand },
        })
    }
}

enum Op {
    Equal,
    GreaterEq,
    LessEq,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(clauses) => {
                write!(f, "(&")?;
                for c in clauses {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Filter::Or(clauses) => {
                write!(f, "(|")?;
                for c in clauses {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Equal { attr, operand } => write!(f, "({attr}={operand})"),
            Filter::GreaterEq { attr, operand } => write!(f, "({attr}>={operand})"),
            Filter::LessEq { attr, operand } => write!(f, "({attr}<={operand})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn attrs(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_simple_equal() {
        let f: Filter = "(package=util.text)".parse().unwrap();
        assert!(f.matches(&attrs(&[("package", "util.text".into())])));
        assert!(!f.matches(&attrs(&[("package", "util.other".into())])));
        assert!(!f.matches(&attrs(&[])));
    }

    #[test]
    fn test_and_with_version_range() {
        let f: Filter = "(&(package=util.text)(version>=1.0.0)(!(version>=2.0.0)))"
            .parse()
            .unwrap();
        let ok = attrs(&[
            ("package", "util.text".into()),
            ("version", Value::Version("1.5".parse::<Version>().unwrap())),
        ]);
        assert!(f.matches(&ok));
        let too_new = attrs(&[
            ("package", "util.text".into()),
            ("version", Value::Version("2.0".parse::<Version>().unwrap())),
        ]);
        assert!(!f.matches(&too_new));
    }

    #[test]
    fn test_or_and_not() {
        let f: Filter = "(|(ee=java)(ee=wasm))".parse().unwrap();
        assert!(f.matches(&attrs(&[("ee", "wasm".into())])));
        assert!(!f.matches(&attrs(&[("ee", "native".into())])));

        let n: Filter = "(!(ee=java))".parse().unwrap();
        assert!(n.matches(&attrs(&[("ee", "wasm".into())])));
        assert!(!n.matches(&attrs(&[("ee", "java".into())])));
    }

    #[test]
    fn test_presence_and_wildcards() {
        let present: Filter = "(version=*)".parse().unwrap();
        assert!(present.matches(&attrs(&[(
            "version",
            Value::Version(Version::EMPTY)
        )])));
        assert!(!present.matches(&attrs(&[])));

        let prefix: Filter = "(name=util.*)".parse().unwrap();
        assert!(prefix.matches(&attrs(&[("name", "util.text".into())])));
        assert!(!prefix.matches(&attrs(&[("name", "core.text".into())])));

        let contains: Filter = "(name=*text*)".parse().unwrap();
        assert!(contains.matches(&attrs(&[("name", "util.text.impl".into())])));
    }

    #[test]
    fn test_list_attribute() {
        let f: Filter = "(tag=fast)".parse().unwrap();
        let a = attrs(&[(
            "tag",
            Value::List(vec!["slow".into(), "fast".into()]),
        )]);
        assert!(f.matches(&a));
    }

    #[test]
    fn test_parse_errors() {
        assert!("(package=util".parse::<Filter>().is_err());
        assert!("package=util".parse::<Filter>().is_err());
        assert!("(=x)".parse::<Filter>().is_err());
        assert!("(a=b)(c=d)".parse::<Filter>().is_err());
        assert!("(noop)".parse::<Filter>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let source = "(&(package=util.text)(version>=1.0.0))";
        let f: Filter = source.parse().unwrap();
        assert_eq!(f.to_string(), source);
        assert_eq!(f.to_string().parse::<Filter>().unwrap(), f);
    }
}
