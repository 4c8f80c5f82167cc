//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::core::{FieldValue, Metric};

/// Format a field value. Numbers are written as floats, text is quoted.
pub fn field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Number(v) => format!("{v}"),
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Text(v) => {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        },
    }
}

/// Encode one metric as a line, or `None` when nothing writable is left.
///
/// InfluxDB rejects points without fields, empty keys, and names starting
/// with `_`. Leading underscores are stripped; empty field keys and empty
/// tags are skipped.
pub fn encode_metric(metric: &Metric) -> Option<String> {
    let measurement = strip_reserved(&metric.name);
    if measurement.is_empty() {
        return None;
    }

    let fields: Vec<(&str, &FieldValue)> = metric
        .fields
        .iter()
        .map(|(key, value)| (strip_reserved(key), value))
        .filter(|(key, _)| !key.is_empty())
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(measurement);

    // BTreeMap iteration gives the sorted tag order InfluxDB prefers.
    for (key, value) in &metric.tags {
        let key = strip_reserved(key);
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    for (i, (key, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&field_value(value));
    }

    line.push(' ');
    line.push_str(&metric.timestamp_nanos().to_string());
    Some(line)
}

/// Encode a batch as a newline-separated request body. Returns the body and
/// the number of metrics skipped for having no fields.
pub fn encode_batch(metrics: &[Metric]) -> (String, usize) {
    let mut body = String::new();
    let mut skipped = 0;
    for metric in metrics {
        match encode_metric(metric) {
            Some(line) => {
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(&line);
            },
            None => skipped += 1,
        }
    }
    (body, skipped)
}

fn strip_reserved(name: &str) -> &str {
    name.trim_start_matches('_')
}

/// Spaces and commas must be escaped in measurement names.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ID_TAG, NAME_TAG};
    use crate::ingest::{AliasTable, EntityCache};
    use chrono::{TimeZone, Utc};

    fn metric() -> Metric {
        let mut metric = Metric::new("home_kitchen_sensor", Utc.timestamp_opt(1, 0).unwrap());
        metric.tags.insert(ID_TAG.to_string(), "devABC".to_string());
        metric
    }

    #[test]
    fn test_field_values() {
        assert_eq!(field_value(&FieldValue::Number(3.15)), "3.15");
        assert_eq!(field_value(&FieldValue::Number(25.0)), "25");
        assert_eq!(field_value(&FieldValue::Bool(true)), "true");
        assert_eq!(field_value(&FieldValue::from("say \"hi\"")), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_encode_metric() {
        let mut metric = metric();
        metric.tags.insert(NAME_TAG.to_string(), "Fridge door".to_string());
        metric
            .fields
            .insert("temperature".to_string(), FieldValue::Number(21.5));
        metric.fields.insert("open".to_string(), FieldValue::Bool(false));

        assert_eq!(
            encode_metric(&metric).unwrap(),
            "home_kitchen_sensor,id=devABC,name=Fridge\\ door open=false,temperature=21.5 1000000000"
        );
    }

    #[test]
    fn test_metric_without_fields_is_skipped() {
        assert!(encode_metric(&metric()).is_none());

        let mut with_field = metric();
        with_field
            .fields
            .insert("state".to_string(), FieldValue::from("on"));
        let (body, skipped) = encode_batch(&[metric(), with_field.clone(), with_field]);
        assert_eq!(skipped, 1);
        assert_eq!(body.lines().count(), 2);
        assert!(body.lines().all(|l| l.ends_with("state=\"on\" 1000000000")));
    }

    #[test]
    fn test_escape_special_chars() {
        let mut metric = Metric::new("my measurement", Utc.timestamp_opt(3, 0).unwrap());
        metric.tags.insert("tag key".to_string(), "tag,value".to_string());
        metric
            .fields
            .insert("field=key".to_string(), FieldValue::from("x"));

        assert_eq!(
            encode_metric(&metric).unwrap(),
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"x\" 3000000000"
        );
    }

    #[test]
    fn test_empty_field_segment_is_not_written() {
        let cache = EntityCache::new(AliasTable::new());
        let metric = cache
            .on_message("home/a/b/dev1/", b"1", Utc.timestamp_opt(5, 0).unwrap())
            .unwrap()
            .unwrap();

        assert!(encode_metric(&metric).is_none());
        let (body, skipped) = encode_batch(&[metric]);
        assert!(body.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_leading_underscore_is_stripped() {
        let cache = EntityCache::new(AliasTable::new());
        let metric = cache
            .on_message("/a/b/dev2/temp", b"1", Utc.timestamp_opt(5, 0).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(metric.name, "_a_b");

        assert_eq!(encode_metric(&metric).unwrap(), "a_b,id=dev2 temp=1 5000000000");
    }

    #[test]
    fn test_reserved_keys_are_stripped_or_skipped() {
        let mut metric = metric();
        metric.tags.insert("_".to_string(), "x".to_string());
        metric
            .fields
            .insert("_battery".to_string(), FieldValue::Number(90.0));
        metric.fields.insert("_".to_string(), FieldValue::Bool(true));

        assert_eq!(
            encode_metric(&metric).unwrap(),
            "home_kitchen_sensor,id=devABC battery=90 1000000000"
        );

        let mut underscores_only = Metric::new("__", Utc.timestamp_opt(1, 0).unwrap());
        underscores_only
            .fields
            .insert("temp".to_string(), FieldValue::Number(1.0));
        assert!(encode_metric(&underscores_only).is_none());
    }
}
