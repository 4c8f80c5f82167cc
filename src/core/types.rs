//! Core domain types.
//!
//! A [`Metric`] is the unit that flows through the whole pipeline: the entity
//! cache produces it, the dispatcher carries it and the sinks consume it.
//! Tags and fields are ordered maps so every sink sees them in a stable order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag set attached to a metric (always contains `id`).
pub type Tags = BTreeMap<String, String>;

/// Field set of a metric, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// Tag key holding the entity id parsed from the topic.
pub const ID_TAG: &str = "id";

/// Tag key holding the display name resolved from the alias table.
pub const NAME_TAG: &str = "name";

/// A decoded scalar field value.
///
/// JSON `null` never becomes a field value; the decoder reports it as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean state (switches, contacts).
    Bool(bool),
    /// Numeric reading.
    Number(f64),
    /// Free-form text state.
    Text(String),
}

impl FieldValue {
    /// Numeric projection used by gauge sinks. Text has no numeric value.
    pub fn as_gauge_value(&self) -> Option<f64> {
        match self {
            FieldValue::Bool(true) => Some(1.0),
            FieldValue::Bool(false) => Some(0.0),
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// A named, timestamped snapshot of one entity's known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name derived from the topic prefix.
    pub name: String,
    /// Tags, always including `id`.
    pub tags: Tags,
    /// Latest known value of every field seen for the entity.
    pub fields: Fields,
    /// Time of the last update.
    pub time: DateTime<Utc>,
}

impl Metric {
    /// Create an empty metric with no tags or fields.
    pub fn new(name: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            fields: Fields::new(),
            time,
        }
    }

    /// Entity id tag, if set.
    pub fn id(&self) -> Option<&str> {
        self.tags.get(ID_TAG).map(String::as_str)
    }

    /// Timestamp in nanoseconds since the Unix epoch, clamped at zero.
    pub fn timestamp_nanos(&self) -> u64 {
        self.time
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0)
    }
}
