//! Short-lived memo of aggregation results.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::clan::{ClanAggregate, ClanSummary};
use crate::patent::TierTable;

/// Values worth caching: everything derived from a full population scan.
#[derive(Debug, Clone)]
pub enum CachedAggregate {
    Clans(Arc<[ClanAggregate]>),
    Clan(Arc<ClanAggregate>),
    Summaries(Arc<[ClanSummary]>),
    Tiers(Arc<TierTable>),
}

pub mod keys {
    pub const ALL_CLANS: &str = "all_clans";
    pub const PATENTS: &str = "patents";

    pub fn clan(name: &str) -> String {
        format!("clan_{}", name.to_lowercase())
    }

    pub fn top_clans(limit: usize) -> String {
        format!("top_clans_{}", limit)
    }

    pub fn similar(name: &str, limit: usize) -> String {
        format!("similar_{}_{}", name.to_lowercase(), limit)
    }
}

pub trait AggregateCache: Send + Sync {
    /// The value together with the instant its source data was read.
    fn get_stamped(&self, key: &str) -> Option<(CachedAggregate, Instant)>;

    /// Stores a value derived from data read at `computed_at`. It expires
    /// one TTL after that instant, not after the insertion.
    fn set_at(&self, key: String, value: CachedAggregate, computed_at: Instant);

    fn clear(&self);
    fn len(&self) -> usize;

    fn get(&self, key: &str) -> Option<CachedAggregate> {
        self.get_stamped(key).map(|(value, _)| value)
    }

    fn set(&self, key: String, value: CachedAggregate) {
        self.set_at(key, value, Instant::now());
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    value: CachedAggregate,
    computed_at: Instant,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    order: VecDeque<String>,
}

impl Entries {
    fn sweep(&mut self, ttl: Duration, now: Instant) {
        self.map
            .retain(|_, entry| now.saturating_duration_since(entry.computed_at) < ttl);
        let map = &self.map;
        self.order.retain(|key| map.contains_key(key));
    }

    fn remove(&mut self, key: &str) {
        if self.map.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }
}

/// Entries expire `ttl` after insertion; at most `max_entries` are kept,
/// evicting the oldest insertion first.
pub struct TtlCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<Entries>,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        // a panic while holding the lock leaves the map consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AggregateCache for TtlCache {
    fn get_stamped(&self, key: &str) -> Option<(CachedAggregate, Instant)> {
        let mut entries = self.lock();
        entries.sweep(self.ttl, Instant::now());
        entries
            .map
            .get(key)
            .map(|entry| (entry.value.clone(), entry.computed_at))
    }

    fn set_at(&self, key: String, value: CachedAggregate, computed_at: Instant) {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.sweep(self.ttl, now);
        entries.remove(&key);
        if now.saturating_duration_since(computed_at) >= self.ttl {
            return;
        }

        while entries.map.len() >= self.max_entries {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.map.remove(&oldest);
        }

        entries.order.push_back(key.clone());
        entries.map.insert(
            key,
            Entry {
                value,
                computed_at,
            },
        );
    }

    fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }

    fn len(&self) -> usize {
        let mut entries = self.lock();
        entries.sweep(self.ttl, Instant::now());
        entries.map.len()
    }
}

/// Used when caching is disabled in the config.
pub struct NoopCache;

impl AggregateCache for NoopCache {
    fn get_stamped(&self, _key: &str) -> Option<(CachedAggregate, Instant)> {
        None
    }

    fn set_at(&self, _key: String, _value: CachedAggregate, _computed_at: Instant) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

pub fn from_config(config: &crate::config::Cache) -> Arc<dyn AggregateCache> {
    if config.enabled {
        Arc::new(TtlCache::new(config.ttl(), config.max_entries))
    } else {
        Arc::new(NoopCache)
    }
}
