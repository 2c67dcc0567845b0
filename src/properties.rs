//! Typed event/handler-registration properties.
//!
//! Mirrors the property-map abstraction §6 calls out as a consumed
//! collaborator: a small closed value union plus a string-keyed map with
//! cheap cloning, since every `post`ed event hands a copy to the async
//! queue independent of the publisher's original map.

use std::collections::BTreeMap;
use std::sync::Arc;

/// A single property value. Closed union: string, integer, float, boolean,
/// or a list of strings (used for multi-valued registration properties such
/// as `event.topics`).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(Arc<str>),
    Long(i64),
    Double(f64),
    Bool(bool),
    StringList(Arc<[String]>),
}

impl PropertyValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s.as_str()))
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Property map carried by events and handler registrations.
///
/// Backed by a `BTreeMap` rather than a hash map: property maps are small
/// (a handful of well-known keys plus whatever a publisher attaches) and a
/// deterministic iteration order makes the filter evaluator's output
/// reproducible in tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, PropertyValue)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
