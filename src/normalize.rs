//! Canonicalization of records prior to hashing.
//!
//! Two records that differ only in field order, value casing, leading or
//! trailing whitespace, or volatile fields produce the same canonical text.
//! Internal whitespace is significant: `"John  Doe"` and `"John Doe"` stay
//! distinct.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::{DedupError, Result};

/// A record as submitted by callers.
pub type Record = serde_json::Map<String, Value>;

/// Field excluded from comparison unless configured otherwise.
pub const DEFAULT_VOLATILE_FIELD: &str = "timestamp";

/// Sorted field map and its serialized text, ready for hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForm {
    fields: BTreeMap<String, String>,
    text: String,
}

impl CanonicalForm {
    /// The serialized form that gets fingerprinted.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Normalized field values keyed by field name.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Nested values after leaf normalization. Maps are `BTreeMap` so key order
/// is stable at every level regardless of how serde_json was built.
#[derive(Serialize)]
#[serde(untagged)]
enum Nested {
    Text(String),
    List(Vec<Nested>),
    Map(BTreeMap<String, Nested>),
}

/// Converts records into their canonical form.
#[derive(Debug, Clone)]
pub struct Normalizer {
    volatile_fields: BTreeSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new([DEFAULT_VOLATILE_FIELD])
    }
}

impl Normalizer {
    /// Create a normalizer that ignores the given fields.
    pub fn new<I, S>(volatile_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            volatile_fields: volatile_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn volatile_fields(&self) -> impl Iterator<Item = &str> {
        self.volatile_fields.iter().map(String::as_str)
    }

    /// Produce the canonical form of `record`.
    ///
    /// Volatile fields are dropped, every remaining value is rendered as
    /// lowercase trimmed text, and the result is serialized with keys in
    /// lexicographic order. Nested objects and arrays are normalized leaf by
    /// leaf and rendered as compact JSON; array order is kept.
    pub fn normalize(&self, record: &Record) -> Result<CanonicalForm> {
        let mut fields = BTreeMap::new();
        for (key, value) in record {
            if self.volatile_fields.contains(key) {
                continue;
            }
            fields.insert(key.clone(), field_text(key, value)?);
        }

        let text = serde_json::to_string(&fields)
            .map_err(|e| DedupError::InvalidRecord(format!("cannot serialize record: {e}")))?;

        Ok(CanonicalForm { fields, text })
    }
}

/// Canonicalize with the default volatile field set.
pub fn normalize(record: &Record) -> Result<CanonicalForm> {
    Normalizer::default().normalize(record)
}

fn field_text(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::Array(_) | Value::Object(_) => serde_json::to_string(&nested(value))
            .map_err(|e| DedupError::InvalidRecord(format!("field '{key}': {e}"))),
        scalar => Ok(scalar_text(scalar)),
    }
}

fn nested(value: &Value) -> Nested {
    match value {
        Value::Array(items) => Nested::List(items.iter().map(nested).collect()),
        Value::Object(map) => Nested::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), nested(v)))
                .collect(),
        ),
        scalar => Nested::Text(scalar_text(scalar)),
    }
}

fn scalar_text(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        // Composite values never reach here; render them verbatim if they do.
        other => other.to_string(),
    };
    raw.to_lowercase().trim().to_string()
}
