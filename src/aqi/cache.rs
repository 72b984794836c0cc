use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::types::StationReading;

/// Cache key for the coarse snapshot holding every station.
pub const ALL_STATIONS_KEY: &str = "*";

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: BTreeMap<String, StationReading>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < ttl
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub entries: usize,
    pub ttl_secs: u64,
    pub all_stations_cached: bool,
    pub all_stations_fresh: bool,
    pub all_stations_age_secs: Option<u64>,
    pub all_stations_count: usize,
}

// Entries are replaced whole, never mutated in place.
pub struct ReadingCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    ttl: Duration,
}

impl ReadingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The entry for `key` and whether it is still within the TTL.
    pub async fn get(&self, key: &str) -> Option<(Arc<CacheEntry>, bool)> {
        let entry = self.entries.read().await.get(key).cloned()?;
        let fresh = entry.is_fresh(self.ttl, Utc::now());
        Some((entry, fresh))
    }

    pub async fn put(&self, key: &str, payload: BTreeMap<String, StationReading>) -> Arc<CacheEntry> {
        self.put_at(key, payload, Utc::now()).await
    }

    pub async fn put_at(
        &self,
        key: &str,
        payload: BTreeMap<String, StationReading>,
        fetched_at: DateTime<Utc>,
    ) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry { payload, fetched_at });
        self.entries
            .write()
            .await
            .insert(key.to_string(), Arc::clone(&entry));
        entry
    }

    pub async fn status(&self) -> CacheStatus {
        let entries = self.entries.read().await;
        let now = Utc::now();
        let all = entries.get(ALL_STATIONS_KEY);

        CacheStatus {
            entries: entries.len(),
            ttl_secs: self.ttl.as_secs(),
            all_stations_cached: all.is_some(),
            all_stations_fresh: all.map_or(false, |e| e.is_fresh(self.ttl, now)),
            all_stations_age_secs: all.map(|e| e.age(now).as_secs()),
            all_stations_count: all.map_or(0, |e| e.payload.len()),
        }
    }
}
