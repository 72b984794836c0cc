use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::aqi::gateway::{AqiGateway, RefreshOutcome};
use crate::subscribers::SubscriberStore;

/// Re-fetch the all-stations snapshot every `period`, starting immediately so the cache is
/// warm before the first request. Stops when `shutdown` flips to true.
pub fn spawn_refresh_loop(
    gateway: Arc<AqiGateway>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            match gateway.refresh().await {
                RefreshOutcome::Refreshed(count) => {
                    tracing::info!("Refreshed AQI readings for {} stations", count)
                }
                RefreshOutcome::Failed(e) => {
                    tracing::warn!("AQI refresh failed, keeping previous snapshot: {}", e)
                }
                RefreshOutcome::Skipped => tracing::debug!("AQI refresh already in progress"),
            }
        }
        tracing::debug!("Refresh loop stopped");
    })
}

/// Evict expired subscriber results every `period`.
pub fn spawn_cleanup_loop(
    subscribers: SubscriberStore,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately and there is nothing to clean yet
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let remaining = subscribers.sweep().await;
            tracing::debug!("{} subscriber results retained", remaining);
        }
        tracing::debug!("Cleanup loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::{cache::ReadingCache, cache::ALL_STATIONS_KEY, fallback::FallbackTable, mock::MockAqiSource};
    use crate::response::tests::sample_report;

    #[tokio::test]
    async fn test_refresh_loop_warms_cache_and_stops() {
        let source = Arc::new(MockAqiSource::new().with_reading("LHR-Gulberg", 120));
        let cache = Arc::new(ReadingCache::new(Duration::from_secs(300)));
        let gateway = Arc::new(AqiGateway::new(
            source.clone(),
            cache.clone(),
            FallbackTable::default(),
            Duration::from_secs(2),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = spawn_refresh_loop(gateway, Duration::from_secs(3600), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let (entry, fresh) = cache.get(ALL_STATIONS_KEY).await.unwrap();
        assert!(fresh);
        assert_eq!(entry.payload["LHR-Gulberg"].aqi, 120);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_loop_sweeps_expired_results() {
        let subscribers = SubscriberStore::new(Duration::from_millis(50));
        subscribers.store("123", sample_report()).await;

        let (tx, rx) = watch::channel(false);
        let handle = spawn_cleanup_loop(subscribers.clone(), Duration::from_millis(100), rx);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(subscribers.len(), 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
