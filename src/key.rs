//! Canonical request keys.
//!
//! A [`RequestKey`] identifies one logical request: the category plus a
//! deterministic serialisation of its parameters. The same key space is
//! used by the response cache and the in-flight table.
//!
//! Parameters go through `serde_json::Value`, whose object maps are
//! ordered by key, so `{"b":1,"a":2}` and `{"a":2,"b":1}` produce the
//! same key regardless of struct field order.

use std::fmt;

use serde::Serialize;

use crate::Result;

/// Canonical `category:params` key.
///
/// The category is kept apart from the serialised params, so a category
/// that itself contains `:` still maps back to its own rate-limit bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    category: String,
    canonical: String,
}

impl RequestKey {
    /// Build a key from a category and serialisable parameters.
    ///
    /// Fails only when `params` cannot be represented as JSON (e.g. a map
    /// with non-string keys), which is a caller bug.
    pub fn new<P: Serialize + ?Sized>(category: &str, params: &P) -> Result<Self> {
        let value = serde_json::to_value(params)?;
        Ok(Self {
            category: category.to_owned(),
            canonical: serde_json::to_string(&value)?,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Canonical JSON of the params.
    pub fn params(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.canonical)
    }
}
