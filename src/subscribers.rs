use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::time::Duration;

use crate::response::AqiReport;

/// Last report computed for a chat subscriber.
#[derive(Clone, Debug, Serialize)]
pub struct StoredResult {
    #[serde(flatten)]
    pub report: AqiReport,
    pub stored_at: DateTime<Utc>,
}

/// Read-your-last-write store keyed by BotSailor subscriber id. Entries expire after the
/// configured TTL; [`SubscriberStore::sweep`] evicts them eagerly.
#[derive(Clone)]
pub struct SubscriberStore {
    cache: Cache<String, StoredResult>,
}

impl SubscriberStore {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub async fn store(&self, subscriber_id: &str, report: AqiReport) {
        let entry = StoredResult {
            report,
            stored_at: Utc::now(),
        };
        self.cache.insert(subscriber_id.to_string(), entry).await;
    }

    pub async fn get(&self, subscriber_id: &str) -> Option<StoredResult> {
        self.cache.get(subscriber_id).await
    }

    /// Evict expired entries and return how many remain.
    pub async fn sweep(&self) -> u64 {
        let before = self.cache.entry_count();
        self.cache.run_pending_tasks().await;
        let after = self.cache.entry_count();
        if before > after {
            tracing::info!("Cleaned up {} expired subscriber results", before - after);
        }
        after
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }
}
