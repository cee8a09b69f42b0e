//! Bounded key-value cache with per-entry time-to-live.
//!
//! Entries expire lazily on `get`/`has` and eagerly through `cleanup`. When
//! the cache is full, inserting a new key evicts the entry with the oldest
//! creation time. With persistence enabled every mutation rewrites the whole
//! table to the backing store under `cache_<name>`; store failures are logged
//! and never surface to the caller.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tuning::{CachePreset, PersistenceMode};

use crate::clock::{Clock, SystemClock};
use crate::store::{PersistentStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfiguration(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to serialize cache table '{namespace}': {source}")]
    Serialize {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode cache table '{namespace}': {source}")]
    Deserialize {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    #[serde(rename = "data")]
    pub value: V,
    #[serde(rename = "timestamp")]
    pub created_at_ms: i64,
    #[serde(rename = "expires_at")]
    pub expires_at_ms: i64,
}

impl<V> CacheEntry<V> {
    pub fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Namespace for the persisted table.
    pub name: String,
    pub capacity: u32,
    pub default_ttl: Duration,
    pub persistence: PersistenceMode,
}

impl CacheOptions {
    pub fn new(name: impl Into<String>, capacity: u32, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            capacity,
            default_ttl,
            persistence: PersistenceMode::None,
        }
    }

    pub fn with_persistence(mut self, persistence: PersistenceMode) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn from_preset(name: impl Into<String>, preset: &CachePreset) -> Self {
        Self::new(name, preset.capacity, preset.ttl).with_persistence(preset.persistence)
    }

    /// Image cache defaults: 30 minute TTL, 50 entries, durable.
    pub fn image() -> Self {
        Self::from_preset("image", &tuning::CachePresets::default().image)
    }

    /// API response cache defaults: 10 minute TTL, 20 entries, session-scoped.
    pub fn api() -> Self {
        Self::from_preset("api", &tuning::CachePresets::default().api)
    }

    pub fn storage_key(&self) -> String {
        format!("cache_{}", self.name)
    }

    fn validate(&self) -> Result<(), CacheError> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfiguration(format!(
                "cache '{}' capacity must be greater than zero",
                self.name
            )));
        }
        if self.default_ttl.as_millis() == 0 {
            return Err(CacheError::InvalidConfiguration(format!(
                "cache '{}' default ttl must be at least one millisecond",
                self.name
            )));
        }
        Ok(())
    }
}

struct Slot<V> {
    seq: u64,
    entry: CacheEntry<V>,
}

pub struct ExpiringCache<V> {
    options: CacheOptions,
    storage_key: String,
    entries: HashMap<String, Slot<V>>,
    next_seq: u64,
    clock: Arc<dyn Clock>,
    store: Option<Box<dyn PersistentStore>>,
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("options", &self.options)
            .field("len", &self.entries.len())
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

impl<V> ExpiringCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Builds a memory-only cache on the system clock.
    pub fn new(options: CacheOptions) -> Result<Self, CacheError> {
        let options = options.with_persistence(PersistenceMode::None);
        Self::with_parts(options, Arc::new(SystemClock), None)
    }

    /// Builds a cache with an explicit clock and backing store.
    ///
    /// A store is required whenever `options.persistence` is not `None`; the
    /// persisted table is loaded immediately, dropping expired entries.
    pub fn with_parts(
        options: CacheOptions,
        clock: Arc<dyn Clock>,
        store: Option<Box<dyn PersistentStore>>,
    ) -> Result<Self, CacheError> {
        options.validate()?;
        let store = match (options.persistence, store) {
            (PersistenceMode::None, Some(_)) => {
                debug!(cache = %options.name, "persistence disabled; ignoring backing store");
                None
            }
            (PersistenceMode::None, None) => None,
            (_, Some(store)) => Some(store),
            (mode, None) => {
                return Err(CacheError::InvalidConfiguration(format!(
                    "cache '{}' uses {mode:?} persistence but no store was supplied",
                    options.name
                )));
            }
        };

        let mut cache = Self {
            storage_key: options.storage_key(),
            options,
            entries: HashMap::new(),
            next_seq: 0,
            clock,
            store,
        };

        if cache.store.is_some() {
            if let Err(err) = cache.load_from_store() {
                warn!(cache = %cache.options.name, error = %err, "failed to load cache from storage");
                cache.entries.clear();
            }
        }

        Ok(cache)
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn set(&mut self, key: &str, value: V, ttl: Option<Duration>) {
        let now = self.clock.now_ms();
        let ttl_ms = ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.options.default_ttl)
            .as_millis()
            .clamp(1, i64::MAX as u128) as i64;
        let entry = CacheEntry {
            value,
            created_at_ms: now,
            expires_at_ms: now.saturating_add(ttl_ms),
        };

        if let Some(slot) = self.entries.get_mut(key) {
            slot.entry = entry;
        } else {
            if self.entries.len() >= self.options.capacity as usize {
                self.evict_oldest();
            }
            let seq = self.bump_seq();
            self.entries.insert(key.to_string(), Slot { seq, entry });
        }

        self.persist();
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        if self.expire_if_stale(key) {
            return None;
        }
        self.entries.get(key).map(|slot| slot.entry.value.clone())
    }

    pub fn has(&mut self, key: &str) -> bool {
        !self.expire_if_stale(key) && self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.persist();
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    /// Sweeps every expired entry, writing the table once at the end.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.entry.is_live(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(cache = %self.options.name, removed, "swept expired cache entries");
            self.persist();
        }
        removed
    }

    pub fn size(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Keys in insertion order, including entries not yet lazily expired.
    pub fn keys(&self) -> Vec<String> {
        let mut ordered: Vec<(&String, u64)> = self
            .entries
            .iter()
            .map(|(key, slot)| (key, slot.seq))
            .collect();
        ordered.sort_by_key(|(_, seq)| *seq);
        ordered.into_iter().map(|(key, _)| key.clone()).collect()
    }

    /// Read-only view of an entry without applying lazy expiry.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key).map(|slot| &slot.entry)
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Removes `key` when it has expired; returns true if it did.
    fn expire_if_stale(&mut self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let stale = self
            .entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_live(now));
        if stale {
            self.entries.remove(key);
            debug!(cache = %self.options.name, key, "cache entry expired");
            self.persist();
        }
        stale
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| (slot.entry.created_at_ms, slot.seq))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!(cache = %self.options.name, key = %key, "evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }

    fn persist(&self) {
        if let Err(err) = self.save_to_store() {
            warn!(cache = %self.options.name, error = %err, "failed to save cache to storage");
        }
    }

    fn save_to_store(&self) -> Result<(), PersistenceError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let table: BTreeMap<&str, &CacheEntry<V>> = self
            .entries
            .iter()
            .map(|(key, slot)| (key.as_str(), &slot.entry))
            .collect();
        let serialized =
            serde_json::to_string(&table).map_err(|source| PersistenceError::Serialize {
                namespace: self.storage_key.clone(),
                source,
            })?;
        store.set(&self.storage_key, &serialized)?;
        Ok(())
    }

    fn load_from_store(&mut self) -> Result<(), PersistenceError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let Some(raw) = store.get(&self.storage_key)? else {
            return Ok(());
        };
        let table: BTreeMap<String, CacheEntry<V>> =
            serde_json::from_str(&raw).map_err(|source| PersistenceError::Deserialize {
                namespace: self.storage_key.clone(),
                source,
            })?;

        let now = self.clock.now_ms();
        let mut live: Vec<(String, CacheEntry<V>)> = table
            .into_iter()
            .filter(|(_, entry)| entry.expires_at_ms > entry.created_at_ms && entry.is_live(now))
            .collect();
        live.sort_by(|(a_key, a), (b_key, b)| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a_key.cmp(b_key))
        });

        let capacity = self.options.capacity as usize;
        let overflow = live.len().saturating_sub(capacity);
        for (key, entry) in live.into_iter().skip(overflow) {
            let seq = self.bump_seq();
            self.entries.insert(key, Slot { seq, entry });
        }
        debug!(
            cache = %self.options.name,
            restored = self.entries.len(),
            dropped_for_capacity = overflow,
            "restored cache from storage"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn memory_cache(capacity: u32, ttl_ms: u64) -> (ExpiringCache<String>, ManualClock) {
        let clock = ManualClock::new(10_000);
        let cache = ExpiringCache::with_parts(
            CacheOptions::new("test", capacity, Duration::from_millis(ttl_ms)),
            Arc::new(clock.clone()),
            None,
        )
        .unwrap();
        (cache, clock)
    }

    fn persisted_cache(
        store: &MemoryStore,
        clock: &ManualClock,
        mode: PersistenceMode,
    ) -> ExpiringCache<String> {
        ExpiringCache::with_parts(
            CacheOptions::new("test", 3, Duration::from_millis(1_000)).with_persistence(mode),
            Arc::new(clock.clone()),
            Some(Box::new(store.clone())),
        )
        .unwrap()
    }

    #[test]
    fn entry_is_live_until_ttl_boundary() {
        let (mut cache, clock) = memory_cache(10, 5_000);
        cache.set("k", "v".into(), Some(Duration::from_millis(300)));
        clock.advance(299);
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        clock.advance(1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn default_ttl_applies_when_none_or_zero() {
        let (mut cache, clock) = memory_cache(10, 100);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), Some(Duration::ZERO));
        let a = cache.peek("a").unwrap();
        assert_eq!(a.expires_at_ms - a.created_at_ms, 100);
        assert_eq!(cache.peek("b").unwrap().expires_at_ms, 10_100);
        clock.advance(100);
        assert!(!cache.has("a"));
        assert!(!cache.has("b"));
    }

    #[test]
    fn size_never_exceeds_capacity_and_evicts_oldest() {
        let (mut cache, clock) = memory_cache(3, 60_000);
        for index in 0..10 {
            cache.set(&format!("k{index}"), index.to_string(), None);
            clock.advance(1);
            assert!(cache.size() <= 3);
        }
        assert_eq!(cache.keys(), vec!["k7", "k8", "k9"]);
    }

    #[test]
    fn eviction_breaks_ties_by_insertion_order() {
        let (mut cache, _clock) = memory_cache(2, 60_000);
        cache.set("first", "1".into(), None);
        cache.set("second", "2".into(), None);
        cache.set("third", "3".into(), None);
        assert_eq!(cache.keys(), vec!["second", "third"]);
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let (mut cache, clock) = memory_cache(2, 60_000);
        cache.set("a", "1".into(), None);
        clock.advance(5);
        cache.set("b", "2".into(), None);
        clock.advance(5);
        cache.set("a", "updated".into(), None);
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert_eq!(cache.peek("a").unwrap().created_at_ms, 10_010);

        cache.set("c", "3".into(), None);
        assert_eq!(cache.keys(), vec!["a", "c"]);
    }

    #[test]
    fn clear_empties_table() {
        let (mut cache, _clock) = memory_cache(5, 1_000);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn delete_reports_removal() {
        let (mut cache, _clock) = memory_cache(5, 1_000);
        cache.set("a", "1".into(), None);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
    }

    #[test]
    fn cleanup_sweeps_expired_entries_only() {
        let (mut cache, clock) = memory_cache(5, 1_000);
        cache.set("short", "1".into(), Some(Duration::from_millis(10)));
        cache.set("long", "2".into(), Some(Duration::from_millis(500)));
        clock.advance(10);
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.keys(), vec!["long"]);
        assert_eq!(cache.cleanup(), 0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let zero_capacity =
            ExpiringCache::<String>::new(CacheOptions::new("bad", 0, Duration::from_secs(1)));
        assert!(matches!(
            zero_capacity,
            Err(CacheError::InvalidConfiguration(_))
        ));
        let zero_ttl = ExpiringCache::<String>::new(CacheOptions::new("bad", 1, Duration::ZERO));
        assert!(matches!(zero_ttl, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn persistence_requires_store() {
        let result = ExpiringCache::<String>::with_parts(
            CacheOptions::image(),
            Arc::new(ManualClock::new(0)),
            None,
        );
        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn mutations_are_mirrored_and_reloaded() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let mut cache = persisted_cache(&store, &clock, PersistenceMode::Durable);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), Some(Duration::from_millis(50)));
        assert!(store.get("cache_test").unwrap().is_some());

        clock.advance(60);
        let mut restored = persisted_cache(&store, &clock, PersistenceMode::Durable);
        assert_eq!(restored.keys(), vec!["a"]);
        assert_eq!(restored.get("a").as_deref(), Some("1"));

        restored.clear();
        assert_eq!(store.get("cache_test").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn persisted_format_uses_original_field_names() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(7);
        let mut cache = persisted_cache(&store, &clock, PersistenceMode::Session);
        cache.set("a", "x".into(), Some(Duration::from_millis(3)));
        let raw = store.get("cache_test").unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["a"]["data"], "x");
        assert_eq!(parsed["a"]["timestamp"], 7);
        assert_eq!(parsed["a"]["expires_at"], 10);
    }

    #[test]
    fn corrupt_store_falls_back_to_empty_table() {
        let store = MemoryStore::new();
        store.set("cache_test", "not json").unwrap();
        let clock = ManualClock::new(0);
        let mut cache = persisted_cache(&store, &clock, PersistenceMode::Durable);
        assert_eq!(cache.size(), 0);
        cache.set("a", "1".into(), None);
        assert_eq!(cache.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn store_failures_leave_memory_authoritative() {
        let store = MemoryStore::with_quota(4);
        let clock = ManualClock::new(0);
        let mut cache = persisted_cache(&store, &clock, PersistenceMode::Durable);
        cache.set("a", "a fairly long value".into(), None);
        assert_eq!(cache.get("a").as_deref(), Some("a fairly long value"));
        assert!(store.get("cache_test").unwrap().is_none());
    }

    #[test]
    fn reload_trims_to_capacity() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let mut wide = ExpiringCache::<String>::with_parts(
            CacheOptions::new("test", 5, Duration::from_secs(60))
                .with_persistence(PersistenceMode::Durable),
            Arc::new(clock.clone()),
            Some(Box::new(store.clone())),
        )
        .unwrap();
        for index in 0..5 {
            wide.set(&format!("k{index}"), index.to_string(), None);
            clock.advance(1);
        }
        let narrow = persisted_cache(&store, &clock, PersistenceMode::Durable);
        assert_eq!(narrow.keys(), vec!["k2", "k3", "k4"]);
    }

    /// Memory store that counts writes.
    #[derive(Clone, Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl CountingStore {
        fn writes(&self) -> usize {
            self.writes.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl PersistentStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn counted_cache(store: &CountingStore, clock: &ManualClock) -> ExpiringCache<String> {
        ExpiringCache::with_parts(
            CacheOptions::new("test", 10, Duration::from_millis(1_000))
                .with_persistence(PersistenceMode::Durable),
            Arc::new(clock.clone()),
            Some(Box::new(store.clone())),
        )
        .unwrap()
    }

    fn stored_keys(store: &CountingStore) -> Vec<String> {
        let raw = store.get("cache_test").unwrap().unwrap();
        let table: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw).unwrap();
        table.into_keys().collect()
    }

    #[test]
    fn cleanup_writes_table_once() {
        let store = CountingStore::default();
        let clock = ManualClock::new(0);
        let mut cache = counted_cache(&store, &clock);
        for index in 0..4 {
            cache.set(&format!("short{index}"), "x".into(), Some(Duration::from_millis(10)));
        }
        cache.set("long", "y".into(), None);
        assert_eq!(store.writes(), 5);

        clock.advance(10);
        assert_eq!(cache.cleanup(), 4);
        assert_eq!(store.writes(), 6);
        assert_eq!(stored_keys(&store), vec!["long"]);

        assert_eq!(cache.cleanup(), 0);
        assert_eq!(store.writes(), 6);
    }

    #[test]
    fn lazy_expiry_rewrites_table() {
        let store = CountingStore::default();
        let clock = ManualClock::new(0);
        let mut cache = counted_cache(&store, &clock);
        cache.set("stale", "x".into(), Some(Duration::from_millis(5)));
        cache.set("fresh", "y".into(), None);
        assert_eq!(store.writes(), 2);

        clock.advance(5);
        assert_eq!(cache.get("stale"), None);
        assert_eq!(store.writes(), 3);
        assert_eq!(stored_keys(&store), vec!["fresh"]);

        cache.set("gone", "z".into(), Some(Duration::from_millis(1)));
        clock.advance(1);
        assert!(!cache.has("gone"));
        assert_eq!(store.writes(), 5);
        assert_eq!(stored_keys(&store), vec!["fresh"]);

        assert_eq!(cache.get("fresh").as_deref(), Some("y"));
        assert_eq!(store.writes(), 5);
    }

    #[test]
    fn presets_match_documented_defaults() {
        let image = CacheOptions::image();
        assert_eq!(image.capacity, 50);
        assert_eq!(image.default_ttl, Duration::from_secs(1_800));
        assert_eq!(image.persistence, PersistenceMode::Durable);
        assert_eq!(image.storage_key(), "cache_image");

        let api = CacheOptions::api();
        assert_eq!(api.capacity, 20);
        assert_eq!(api.default_ttl, Duration::from_secs(600));
        assert_eq!(api.persistence, PersistenceMode::Session);
    }
}
