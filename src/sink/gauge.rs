//! Gauge registry sink and the collector that feeds it.
//!
//! Label sets differ between entities of the same metric (only aliased
//! devices carry `name`, text fields add `value`), so gauges are keyed by
//! name plus the full sorted label set rather than by a fixed schema.

use crate::core::{FieldValue, Metric};
use crate::monitoring::PipelineStats;
use crate::sink::GaugeSink;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Label carrying the text of a string-valued field.
pub const TEXT_VALUE_LABEL: &str = "value";

/// A gauge label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GaugeKey {
    name: String,
    labels: Vec<Label>,
}

/// In-memory registry of gauges rendered in Prometheus text format.
#[derive(Debug, Default)]
pub struct GaugeRegistry {
    gauges: DashMap<GaugeKey, f64>,
}

impl GaugeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a gauge.
    pub fn get(&self, key: &[&str], labels: &[Label]) -> Option<f64> {
        self.gauges.get(&gauge_key(key, labels)).map(|v| *v)
    }

    /// Number of distinct series.
    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    /// True when no gauge has been set.
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }

    /// Render every gauge in the Prometheus text exposition format, sorted
    /// by name and labels.
    pub fn render(&self) -> String {
        let mut families: BTreeMap<String, Vec<(Vec<Label>, f64)>> = BTreeMap::new();
        for entry in &self.gauges {
            families
                .entry(entry.key().name.clone())
                .or_default()
                .push((entry.key().labels.clone(), *entry.value()));
        }

        let mut out = String::new();
        for (name, mut series) in families {
            series.sort_by(|a, b| a.0.cmp(&b.0));
            let _ = writeln!(out, "# TYPE {name} gauge");
            for (labels, value) in series {
                out.push_str(&name);
                if !labels.is_empty() {
                    out.push('{');
                    for (i, label) in labels.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        let _ = write!(out, "{}=\"{}\"", label.name, escape_label_value(&label.value));
                    }
                    out.push('}');
                }
                let _ = writeln!(out, " {value}");
            }
        }
        out
    }
}

impl GaugeSink for GaugeRegistry {
    fn set_gauge(&self, key: &[&str], value: f64, labels: &[Label]) {
        self.gauges.insert(gauge_key(key, labels), value);
    }
}

fn gauge_key(key: &[&str], labels: &[Label]) -> GaugeKey {
    let mut labels: Vec<Label> = labels
        .iter()
        .map(|l| Label::new(sanitize_name(&l.name, false), l.value.as_str()))
        .collect();
    // Stable sort keeps the first of any duplicate names.
    labels.sort_by(|a, b| a.name.cmp(&b.name));
    labels.dedup_by(|later, earlier| later.name == earlier.name);

    GaugeKey {
        name: sanitize_name(&key.join("_"), true),
        labels,
    }
}

/// Replace characters Prometheus does not allow in metric or label names.
fn sanitize_name(raw: &str, allow_colon: bool) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Turns metric snapshots into gauge updates.
pub struct GaugeCollector {
    sink: Arc<dyn GaugeSink>,
    stats: Arc<PipelineStats>,
}

impl GaugeCollector {
    /// Collector writing to `sink`.
    pub fn new(sink: Arc<dyn GaugeSink>, stats: Arc<PipelineStats>) -> Self {
        Self { sink, stats }
    }

    /// Set one gauge per field: numbers as-is, booleans as 1/0, text as 1
    /// with the text in a `value` label. Tags become labels.
    pub fn update(&self, metric: &Metric) {
        let labels: Vec<Label> = metric
            .tags
            .iter()
            .map(|(name, value)| Label::new(name.as_str(), value.as_str()))
            .collect();

        for (field, value) in &metric.fields {
            let key = [metric.name.as_str(), field.as_str()];
            match value {
                FieldValue::Text(text) => {
                    let mut text_labels = Vec::with_capacity(labels.len() + 1);
                    text_labels.push(Label::new(TEXT_VALUE_LABEL, text.as_str()));
                    text_labels.extend(labels.iter().cloned());
                    self.sink.set_gauge(&key, 1.0, &text_labels);
                },
                other => {
                    let gauge = other.as_gauge_value().unwrap_or_default();
                    self.sink.set_gauge(&key, gauge, &labels);
                },
            }
        }
        self.stats.record_gauges(metric.fields.len());
    }

    /// Apply snapshots until the dispatcher is closed.
    pub async fn run(&self, mut updates: mpsc::Receiver<Metric>) {
        while let Some(metric) = updates.recv().await {
            self.update(&metric);
        }
        tracing::debug!("Dispatcher drained, gauge collector stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ID_TAG, NAME_TAG};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn snapshot() -> Metric {
        let mut metric = Metric::new("home_kitchen_sensor", Utc::now());
        metric.tags.insert(ID_TAG.to_string(), "devABC".to_string());
        metric.tags.insert(NAME_TAG.to_string(), "Fridge".to_string());
        metric
            .fields
            .insert("temperature".to_string(), FieldValue::Number(4.5));
        metric.fields.insert("open".to_string(), FieldValue::Bool(true));
        metric
            .fields
            .insert("state".to_string(), FieldValue::from("cooling"));
        metric
    }

    fn tag_labels() -> Vec<Label> {
        vec![Label::new("id", "devABC"), Label::new("name", "Fridge")]
    }

    #[test]
    fn test_collector_sets_one_gauge_per_field() {
        let registry = Arc::new(GaugeRegistry::new());
        let collector = GaugeCollector::new(
            Arc::clone(&registry) as Arc<dyn GaugeSink>,
            Arc::new(PipelineStats::new()),
        );
        collector.update(&snapshot());

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.get(&["home_kitchen_sensor", "temperature"], &tag_labels()),
            Some(4.5)
        );
        assert_eq!(registry.get(&["home_kitchen_sensor", "open"], &tag_labels()), Some(1.0));

        let mut text_labels = tag_labels();
        text_labels.push(Label::new("value", "cooling"));
        assert_eq!(registry.get(&["home_kitchen_sensor", "state"], &text_labels), Some(1.0));
    }

    #[test]
    fn test_false_is_zero_and_updates_overwrite() {
        let registry = Arc::new(GaugeRegistry::new());
        let collector = GaugeCollector::new(
            Arc::clone(&registry) as Arc<dyn GaugeSink>,
            Arc::new(PipelineStats::new()),
        );

        let mut metric = snapshot();
        collector.update(&metric);
        metric.fields.insert("open".to_string(), FieldValue::Bool(false));
        collector.update(&metric);

        assert_eq!(registry.get(&["home_kitchen_sensor", "open"], &tag_labels()), Some(0.0));
    }

    #[test]
    fn test_render_text_format() {
        let registry = GaugeRegistry::new();
        registry.set_gauge(&["home_sensor", "temp"], 21.5, &[Label::new("id", "b")]);
        registry.set_gauge(&["home_sensor", "temp"], 19.0, &[Label::new("id", "a")]);
        registry.set_gauge(
            &["home_sensor", "state"],
            1.0,
            &[Label::new("value", "say \"hi\""), Label::new("id", "a")],
        );

        assert_eq!(
            registry.render(),
            "# TYPE home_sensor_state gauge\n\
             home_sensor_state{id=\"a\",value=\"say \\\"hi\\\"\"} 1\n\
             # TYPE home_sensor_temp gauge\n\
             home_sensor_temp{id=\"a\"} 19\n\
             home_sensor_temp{id=\"b\"} 21.5\n"
        );
    }

    #[test]
    fn test_names_are_sanitized() {
        let registry = GaugeRegistry::new();
        registry.set_gauge(&["1st-floor", "temp.c"], 1.0, &[Label::new("dev-id", "x")]);
        assert_eq!(
            registry.render(),
            "# TYPE _1st_floor_temp_c gauge\n_1st_floor_temp_c{dev_id=\"x\"} 1\n"
        );
    }

    #[test]
    fn test_text_value_label_wins_over_tag() {
        let registry = GaugeRegistry::new();
        registry.set_gauge(
            &["m", "f"],
            1.0,
            &[Label::new("value", "text"), Label::new("value", "tag")],
        );
        assert_eq!(registry.get(&["m", "f"], &[Label::new("value", "text")]), Some(1.0));
    }
}
