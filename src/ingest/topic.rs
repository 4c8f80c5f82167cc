//! Topic grammar and the alias table.
//!
//! Topics look like `<segment>/…/<id>/<field>` with at least five segments.
//! Everything before the id is the metric name (joined with `_`).

use crate::core::{Tags, ID_TAG, NAME_TAG};
use std::collections::HashMap;

/// Minimum number of `/`-separated segments for a metric topic.
pub const MIN_TOPIC_SEGMENTS: usize = 5;

/// Result of parsing a metric topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    /// Metric name, e.g. `home_kitchen_sensor`
    pub metric_name: String,
    /// Fresh tag set for this message
    pub tags: Tags,
    /// Field addressed by the message
    pub field: String,
}

impl ParsedTopic {
    /// Cache key `<metricName>:<id>`.
    pub fn cache_key(&self) -> String {
        let id = self.tags.get(ID_TAG).map_or("", String::as_str);
        alias_key(&self.metric_name, id)
    }
}

/// Static `<metricName>:<id>` to display-name mapping.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    names: HashMap<String, String>,
}

impl AliasTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `key=value` arguments. Entries that do not contain exactly
    /// one `=` are skipped.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter()
            .filter_map(|arg| {
                let parsed = parse_alias_arg(arg.as_ref());
                if parsed.is_none() {
                    tracing::warn!("Ignoring malformed alias argument '{}'", arg.as_ref());
                }
                parsed
            })
            .collect()
    }

    /// Look up the display name for a metric/id pair.
    pub fn resolve(&self, metric_name: &str, id: &str) -> Option<&str> {
        self.names.get(&alias_key(metric_name, id)).map(String::as_str)
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no aliases are configured.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, String)> for AliasTable {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AliasTable {
    type Item = (String, String);
    type IntoIter = std::collections::hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.into_iter()
    }
}

impl From<HashMap<String, String>> for AliasTable {
    fn from(names: HashMap<String, String>) -> Self {
        Self { names }
    }
}

/// Split a single `key=value` alias argument.
pub fn parse_alias_arg(arg: &str) -> Option<(String, String)> {
    let mut parts = arg.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
        _ => None,
    }
}

fn alias_key(metric_name: &str, id: &str) -> String {
    format!("{metric_name}:{id}")
}

/// Parse a topic into metric name, tags and field.
///
/// Returns `None` when the topic has fewer than [`MIN_TOPIC_SEGMENTS`]
/// segments; such messages are not metrics.
pub fn parse_topic(topic: &str, aliases: &AliasTable) -> Option<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() < MIN_TOPIC_SEGMENTS {
        return None;
    }

    let (prefix, tail) = parts.split_at(parts.len() - 2);
    let id = tail[0];
    let field = tail[1];
    let metric_name = prefix.join("_");

    let mut tags = Tags::new();
    tags.insert(ID_TAG.to_string(), id.to_string());
    if let Some(name) = aliases.resolve(&metric_name, id) {
        tags.insert(NAME_TAG.to_string(), name.to_string());
    }

    Some(ParsedTopic {
        metric_name,
        tags,
        field: field.to_string(),
    })
}
