//! LDAP-style property filter (RFC 1960 subset), compiled once at
//! subscription time and evaluated as a pure function against an event's
//! properties.
//!
//! Supported grammar:
//!
//! ```text
//! filter     := '(' filter-comp ')'
//! filter-comp:= and | or | not | item
//! and        := '&' filter+
//! or         := '|' filter+
//! not        := '!' filter
//! item       := attr ('=' | '>=' | '<=') value
//! value      := '*' | literal
//! ```
//!
//! `(attr=*)` is a presence test: it matches when `attr` is set to any
//! value. Comparisons other than equality treat both sides as their
//! "natural" ordering (numeric if both parse as `i64`/`f64`, lexicographic
//! otherwise).

use crate::error::EventAdminError;
use crate::properties::{Properties, PropertyValue};

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present { attr: String },
    Equals { attr: String, value: String },
    GreaterEq { attr: String, value: String },
    LessEq { attr: String, value: String },
}

impl Filter {
    /// Evaluate this filter against a property map.
    #[must_use]
    pub fn matches(&self, props: &Properties) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|f| f.matches(props)),
            Self::Or(parts) => parts.iter().any(|f| f.matches(props)),
            Self::Not(inner) => !inner.matches(props),
            Self::Present { attr } => props.get(attr).is_some(),
            Self::Equals { attr, value } => prop_as_text(props, attr).is_some_and(|v| v == *value),
            Self::GreaterEq { attr, value } => {
                compare(props, attr, value).is_some_and(|ord| ord.is_ge())
            }
            Self::LessEq { attr, value } => {
                compare(props, attr, value).is_some_and(|ord| ord.is_le())
            }
        }
    }
}

fn prop_as_text(props: &Properties, attr: &str) -> Option<String> {
    props.get(attr).map(|v| match v {
        PropertyValue::String(s) => s.to_string(),
        PropertyValue::Long(v) => v.to_string(),
        PropertyValue::Double(v) => v.to_string(),
        PropertyValue::Bool(v) => v.to_string(),
        PropertyValue::StringList(items) => items.join(","),
    })
}

fn compare(props: &Properties, attr: &str, value: &str) -> Option<std::cmp::Ordering> {
    let actual = prop_as_text(props, attr)?;
    if let (Ok(a), Ok(b)) = (actual.parse::<f64>(), value.parse::<f64>()) {
        a.partial_cmp(&b)
    } else {
        Some(actual.as_str().cmp(value))
    }
}

/// Compile an LDAP-style filter string. Rejected as
/// [`EventAdminError::invalid_argument`] on any syntax error, matching the
/// `add_handler` contract (§4.2): a malformed filter never surfaces during
/// dispatch, only at registration.
pub fn compile(expr: &str) -> Result<Filter, EventAdminError> {
    let mut parser = Parser { input: expr.as_bytes(), pos: 0 };
    let filter = parser.parse_filter()?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(EventAdminError::invalid_argument(format!(
            "trailing input in filter: {expr}"
        )));
    }
    Ok(filter)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), EventAdminError> {
        self.skip_ws();
        if self.input.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(EventAdminError::invalid_argument(format!(
                "expected '{}' at offset {}",
                byte as char, self.pos
            )))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, EventAdminError> {
        self.expect(b'(')?;
        self.skip_ws();
        let filter = match self.input.get(self.pos) {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            _ => self.parse_item()?,
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Filter>, EventAdminError> {
        let mut filters = Vec::new();
        self.skip_ws();
        while self.input.get(self.pos) == Some(&b'(') {
            filters.push(self.parse_filter()?);
            self.skip_ws();
        }
        if filters.is_empty() {
            return Err(EventAdminError::invalid_argument(
                "combinator requires at least one sub-filter",
            ));
        }
        Ok(filters)
    }

    fn parse_item(&mut self) -> Result<Filter, EventAdminError> {
        let start = self.pos;
        while self
            .input
            .get(self.pos)
            .is_some_and(|&b| b != b'=' && b != b'>' && b != b'<' && b != b')')
        {
            self.pos += 1;
        }
        let attr = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| EventAdminError::invalid_argument("non-utf8 attribute name"))?
            .trim()
            .to_string();
        if attr.is_empty() {
            return Err(EventAdminError::invalid_argument("empty attribute name"));
        }

        let op_start = self.pos;
        let (op_len, build): (usize, fn(String, String) -> Filter) = match self.input.get(self.pos)
        {
            Some(b'>') if self.input.get(self.pos + 1) == Some(&b'=') => {
                (2, |attr, value| Filter::GreaterEq { attr, value })
            }
            Some(b'<') if self.input.get(self.pos + 1) == Some(&b'=') => {
                (2, |attr, value| Filter::LessEq { attr, value })
            }
            Some(b'=') => (1, |attr, value| Filter::Equals { attr, value }),
            _ => {
                return Err(EventAdminError::invalid_argument(format!(
                    "expected comparison operator at offset {op_start}"
                )));
            }
        };
        self.pos += op_len;

        let value_start = self.pos;
        while self.input.get(self.pos).is_some_and(|&b| b != b')') {
            self.pos += 1;
        }
        let value = std::str::from_utf8(&self.input[value_start..self.pos])
            .map_err(|_| EventAdminError::invalid_argument("non-utf8 filter value"))?
            .to_string();

        if value == "*" && op_len == 1 {
            return Ok(Filter::Present { attr });
        }
        Ok(build(attr, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().fold(Properties::new(), |mut p, (k, v)| {
            p.insert(*k, *v);
            p
        })
    }

    #[test]
    fn equality_matches() {
        let f = compile("(key=value)").unwrap();
        assert!(f.matches(&props(&[("key", "value")])));
        assert!(!f.matches(&props(&[("key", "value2")])));
    }

    #[test]
    fn presence_matches_any_value() {
        let f = compile("(key=*)").unwrap();
        assert!(f.matches(&props(&[("key", "anything")])));
        assert!(!f.matches(&props(&[("other", "x")])));
    }

    #[test]
    fn and_or_not_combinators() {
        let f = compile("(&(a=1)(|(b=2)(b=3)))").unwrap();
        assert!(f.matches(&props(&[("a", "1"), ("b", "3")])));
        assert!(!f.matches(&props(&[("a", "1"), ("b", "4")])));

        let not_f = compile("(!(a=1))").unwrap();
        assert!(!not_f.matches(&props(&[("a", "1")])));
        assert!(not_f.matches(&props(&[("a", "2")])));
    }

    #[test]
    fn numeric_range_comparisons() {
        let f = compile("(count>=3)").unwrap();
        assert!(f.matches(&props(&[("count", "5")])));
        assert!(!f.matches(&props(&[("count", "2")])));
    }

    #[test]
    fn malformed_filter_is_invalid_argument() {
        let err = compile("(key=value").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);

        assert!(compile("key=value)").is_err());
        assert!(compile("()").is_err());
    }
}
