//! Per-entity state cache.
//!
//! Each message carries a single field. The cache merges those field updates
//! into one record per `(metric name, entity id)` and hands out owned
//! snapshots of the merged record.

use crate::core::{Metric, Result};
use crate::ingest::payload::decode_value;
use crate::ingest::topic::{parse_topic, AliasTable};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Decides which entries to drop after a new entity was inserted.
pub trait EvictionPolicy: Send + Sync {
    /// Return the keys to remove. `inserted` is the key that was just added
    /// and must not be returned.
    fn select_victims(&self, entries: &AHashMap<String, Metric>, inserted: &str) -> Vec<String>;
}

/// Keep every entity for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn select_victims(&self, _entries: &AHashMap<String, Metric>, _inserted: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Cap the number of entities, dropping the least recently updated ones.
#[derive(Debug, Clone, Copy)]
pub struct MaxEntries(pub usize);

impl EvictionPolicy for MaxEntries {
    fn select_victims(&self, entries: &AHashMap<String, Metric>, inserted: &str) -> Vec<String> {
        let excess = entries.len().saturating_sub(self.0);
        if excess == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<(&String, DateTime<Utc>)> = entries
            .iter()
            .filter(|(key, _)| key.as_str() != inserted)
            .map(|(key, metric)| (key, metric.time))
            .collect();
        candidates.sort_by_key(|(_, time)| *time);
        candidates
            .into_iter()
            .take(excess)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Keyed store of the latest known state of every entity.
pub struct EntityCache {
    aliases: AliasTable,
    entries: Mutex<AHashMap<String, Metric>>,
    eviction: Box<dyn EvictionPolicy>,
}

impl EntityCache {
    /// Unbounded cache.
    pub fn new(aliases: AliasTable) -> Self {
        Self::with_eviction(aliases, Box::new(Unbounded))
    }

    /// Cache with a custom eviction policy.
    pub fn with_eviction(aliases: AliasTable, eviction: Box<dyn EvictionPolicy>) -> Self {
        Self {
            aliases,
            entries: Mutex::new(AHashMap::new()),
            eviction,
        }
    }

    /// Cache built from the optional `cache.max_entries` setting.
    pub fn with_max_entries(aliases: AliasTable, max_entries: Option<usize>) -> Self {
        match max_entries {
            Some(max) => Self::with_eviction(aliases, Box::new(MaxEntries(max))),
            None => Self::new(aliases),
        }
    }

    /// Apply one message.
    ///
    /// Returns `Ok(None)` for topics that are not metrics, an error when the
    /// payload cannot be decoded (the cache is left untouched), and otherwise
    /// an owned snapshot of the updated entry. An absent value still refreshes
    /// the tags and timestamp.
    pub fn on_message(
        &self,
        topic: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Metric>> {
        let Some(parsed) = parse_topic(topic, &self.aliases) else {
            return Ok(None);
        };
        let value = decode_value(payload)?;
        let key = parsed.cache_key();

        let mut entries = self.entries.lock();
        let inserted = !entries.contains_key(&key);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Metric::new(parsed.metric_name.as_str(), now));

        entry.tags = parsed.tags;
        if let Some(value) = value {
            entry.fields.insert(parsed.field, value);
        }
        entry.time = now;
        let snapshot = entry.clone();

        if inserted {
            for victim in self.eviction.select_victims(&entries, &key) {
                tracing::debug!("Evicting cache entry {}", victim);
                entries.remove(&victim);
            }
        }

        Ok(Some(snapshot))
    }

    /// Owned copy of one entry.
    pub fn get(&self, metric_name: &str, id: &str) -> Option<Metric> {
        self.entries.lock().get(&format!("{metric_name}:{id}")).cloned()
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldValue, ID_TAG, NAME_TAG};
    use chrono::Duration;

    const TEMP: &str = "home/kitchen/sensor/devABC/temperature";
    const HUMIDITY: &str = "home/kitchen/sensor/devABC/humidity";

    #[test]
    fn test_fields_merge_across_updates() {
        let cache = EntityCache::new(AliasTable::new());
        let t0 = Utc::now();

        let first = cache.on_message(TEMP, b"21.5", t0).unwrap().unwrap();
        assert_eq!(first.fields.len(), 1);

        let second = cache
            .on_message(HUMIDITY, b"{\"value\":40}", t0 + Duration::seconds(1))
            .unwrap()
            .unwrap();

        assert_eq!(second.name, "home_kitchen_sensor");
        assert_eq!(second.fields["temperature"], FieldValue::Number(21.5));
        assert_eq!(second.fields["humidity"], FieldValue::Number(40.0));
        assert_eq!(second.time, t0 + Duration::seconds(1));
    }

    #[test]
    fn test_other_ids_do_not_interfere() {
        let cache = EntityCache::new(AliasTable::new());
        let now = Utc::now();

        cache.on_message(TEMP, b"21.5", now).unwrap();
        let other = cache
            .on_message("home/kitchen/sensor/devXYZ/temperature", b"5", now)
            .unwrap()
            .unwrap();
        assert_eq!(other.tags[ID_TAG], "devXYZ");

        let first = cache.get("home_kitchen_sensor", "devABC").unwrap();
        assert_eq!(first.fields["temperature"], FieldValue::Number(21.5));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_absent_value_refreshes_time_only() {
        let cache = EntityCache::new(AliasTable::new());
        let t0 = Utc::now();
        cache.on_message(TEMP, b"21.5", t0).unwrap();

        let t1 = t0 + Duration::seconds(10);
        let snapshot = cache.on_message(TEMP, b"", t1).unwrap().unwrap();
        assert_eq!(snapshot.fields["temperature"], FieldValue::Number(21.5));
        assert_eq!(snapshot.time, t1);

        let t2 = t1 + Duration::seconds(10);
        let snapshot = cache.on_message(TEMP, b"null", t2).unwrap().unwrap();
        assert_eq!(snapshot.fields.len(), 1);
        assert_eq!(snapshot.time, t2);
    }

    #[test]
    fn test_first_message_without_value_creates_empty_entry() {
        let cache = EntityCache::new(AliasTable::new());
        let snapshot = cache.on_message(TEMP, b"", Utc::now()).unwrap().unwrap();
        assert!(snapshot.fields.is_empty());
        assert_eq!(snapshot.tags[ID_TAG], "devABC");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_decode_error_leaves_cache_untouched() {
        let cache = EntityCache::new(AliasTable::new());
        let t0 = Utc::now();
        cache.on_message(TEMP, b"21.5", t0).unwrap();

        let result = cache.on_message(TEMP, b"{broken", t0 + Duration::seconds(5));
        assert!(result.is_err());

        let entry = cache.get("home_kitchen_sensor", "devABC").unwrap();
        assert_eq!(entry.time, t0);
        assert_eq!(entry.fields["temperature"], FieldValue::Number(21.5));

        assert!(cache.on_message("home/x/y/new/f", b"nope", t0).is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_non_metric_topic_is_ignored() {
        let cache = EntityCache::new(AliasTable::new());
        assert!(cache.on_message("a/b/c", b"1", Utc::now()).unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_is_independent_of_cache() {
        let cache = EntityCache::new(AliasTable::new());
        let now = Utc::now();
        let mut snapshot = cache.on_message(TEMP, b"21.5", now).unwrap().unwrap();
        snapshot
            .fields
            .insert("temperature".to_string(), FieldValue::Number(0.0));

        let entry = cache.get("home_kitchen_sensor", "devABC").unwrap();
        assert_eq!(entry.fields["temperature"], FieldValue::Number(21.5));
    }

    #[test]
    fn test_tags_are_replaced_each_update() {
        let aliases = AliasTable::from_args(["home_kitchen_sensor:devABC=Fridge"]);
        let cache = EntityCache::new(aliases);
        let snapshot = cache.on_message(TEMP, b"1", Utc::now()).unwrap().unwrap();
        assert_eq!(snapshot.tags[NAME_TAG], "Fridge");
        assert_eq!(snapshot.tags.len(), 2);
    }

    #[test]
    fn test_max_entries_evicts_least_recently_updated() {
        let cache = EntityCache::with_max_entries(AliasTable::new(), Some(2));
        let t0 = Utc::now();

        cache.on_message("h/a/s/one/t", b"1", t0).unwrap();
        cache.on_message("h/a/s/two/t", b"2", t0 + Duration::seconds(1)).unwrap();
        cache.on_message("h/a/s/one/t", b"3", t0 + Duration::seconds(2)).unwrap();
        cache.on_message("h/a/s/three/t", b"4", t0 + Duration::seconds(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("h_a_s", "two").is_none());
        assert!(cache.get("h_a_s", "one").is_some());
        assert!(cache.get("h_a_s", "three").is_some());
    }
}
