use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::cache::{CacheEntry, ReadingCache, ALL_STATIONS_KEY};
use super::fallback::FallbackTable;
use super::types::{classify_aqi_payload, AqiReading, ParseError, ReadingSource, StationReading, UpstreamPayload};
use super::{AqiSource, UpstreamError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("No AQI data available for {0}")]
    DataUnavailable(String),
    #[error("No AQI data available for any station")]
    NoData,
}

#[derive(Debug, Clone)]
pub struct ReadingSet {
    pub readings: BTreeMap<String, AqiReading>,
    pub source: ReadingSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed(usize),
    Failed(String),
    /// Another refresh was already running.
    Skipped,
}

pub struct AqiGateway {
    source: Arc<dyn AqiSource>,
    cache: Arc<ReadingCache>,
    fallback: FallbackTable,
    fetch_timeout: Duration,
    refresh_in_flight: AtomicBool,
}

/// Clears the in-flight flag even if the refresh future is dropped mid-way.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AqiGateway {
    pub fn new(
        source: Arc<dyn AqiSource>,
        cache: Arc<ReadingCache>,
        fallback: FallbackTable,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            fallback,
            fetch_timeout,
            refresh_in_flight: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &ReadingCache {
        &self.cache
    }

    pub fn fallback(&self) -> &FallbackTable {
        &self.fallback
    }

    /// Reading for one station.
    ///
    /// Both the per-station entry and the all-stations snapshot can satisfy the cache tiers.
    pub async fn get_reading(&self, station: &str) -> Result<AqiReading, GatewayError> {
        let mut cached: Vec<(Arc<CacheEntry>, bool)> = Vec::with_capacity(2);
        for key in [station, ALL_STATIONS_KEY] {
            if let Some(hit) = self.cache.get(key).await {
                if hit.0.payload.contains_key(station) {
                    cached.push(hit);
                }
            }
        }

        if let Some((entry, _)) = cached
            .iter()
            .filter(|(_, fresh)| *fresh)
            .max_by_key(|(entry, _)| entry.fetched_at)
        {
            tracing::debug!("Cache hit for {}", station);
            return Ok(AqiReading::new(station, &entry.payload[station], ReadingSource::Cache));
        }

        match self.fetch_station(station).await {
            Ok(reading) => {
                let tagged = AqiReading::new(station, &reading, ReadingSource::Api);
                self.cache
                    .put(station, BTreeMap::from([(station.to_string(), reading)]))
                    .await;
                return Ok(tagged);
            }
            Err(e) => tracing::warn!("Live AQI fetch for {} failed: {}", station, e),
        }

        if let Some((entry, _)) = cached.iter().max_by_key(|(entry, _)| entry.fetched_at) {
            tracing::info!(
                "Serving stale reading for {} ({}s old)",
                station,
                entry.age(Utc::now()).as_secs()
            );
            return Ok(AqiReading::new(station, &entry.payload[station], ReadingSource::StaleCache));
        }

        if let Some(reading) = self.fallback.get(station) {
            tracing::info!("Serving fallback reading for {}", station);
            return Ok(AqiReading::new(station, reading, ReadingSource::Fallback));
        }

        Err(GatewayError::DataUnavailable(station.to_string()))
    }

    /// Readings for every station the upstream reports.
    pub async fn get_all_readings(&self) -> Result<ReadingSet, GatewayError> {
        let cached = self.cache.get(ALL_STATIONS_KEY).await;

        if let Some((entry, true)) = &cached {
            tracing::debug!("Cache hit for all stations");
            return Ok(Self::reading_set(entry, ReadingSource::Cache));
        }

        match self.fetch_and_store_all().await {
            Ok(entry) => return Ok(Self::reading_set(&entry, ReadingSource::Api)),
            Err(e) => tracing::warn!("Live AQI fetch for all stations failed: {}", e),
        }

        if let Some((entry, _)) = &cached {
            tracing::info!(
                "Serving stale readings for all stations ({}s old)",
                entry.age(Utc::now()).as_secs()
            );
            return Ok(Self::reading_set(entry, ReadingSource::StaleCache));
        }

        if !self.fallback.is_empty() {
            tracing::info!("Serving fallback readings for all stations");
            let readings = self
                .fallback
                .readings()
                .iter()
                .map(|(station, reading)| {
                    (station.clone(), AqiReading::new(station, reading, ReadingSource::Fallback))
                })
                .collect();
            return Ok(ReadingSet {
                readings,
                source: ReadingSource::Fallback,
            });
        }

        Err(GatewayError::NoData)
    }

    /// Re-fetch the all-stations snapshot. Concurrent calls are skipped rather than queued.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return RefreshOutcome::Skipped;
        }
        let _guard = RefreshGuard(&self.refresh_in_flight);

        match self.fetch_and_store_all().await {
            Ok(entry) => RefreshOutcome::Refreshed(entry.payload.len()),
            Err(e) => RefreshOutcome::Failed(e.to_string()),
        }
    }

    async fn fetch_and_store_all(&self) -> Result<Arc<CacheEntry>, UpstreamError> {
        let body = self.with_timeout(self.source.fetch_all()).await?;
        let readings = match classify_aqi_payload(body)? {
            UpstreamPayload::Keyed(readings) => readings,
            UpstreamPayload::Flat(_) => {
                return Err(UpstreamError::ApiError(
                    "expected readings keyed by station".to_string(),
                ))
            }
            UpstreamPayload::Error(message) => return Err(UpstreamError::ApiError(message)),
        };
        Ok(self.cache.put(ALL_STATIONS_KEY, readings).await)
    }

    async fn fetch_station(&self, station: &str) -> Result<StationReading, UpstreamError> {
        let body = self.with_timeout(self.source.fetch_station(station)).await?;
        match classify_aqi_payload(body)? {
            UpstreamPayload::Flat(reading) => Ok(reading),
            UpstreamPayload::Keyed(mut readings) => readings
                .remove(station)
                .ok_or_else(|| ParseError::MissingStation(station.to_string()).into()),
            UpstreamPayload::Error(message) => Err(UpstreamError::ApiError(message)),
        }
    }

    async fn with_timeout<F>(&self, request: F) -> Result<serde_json::Value, UpstreamError>
    where
        F: std::future::Future<Output = Result<serde_json::Value, UpstreamError>>,
    {
        tokio::time::timeout(self.fetch_timeout, request)
            .await
            .map_err(|_| UpstreamError::Timeout(self.fetch_timeout.as_secs()))?
    }

    fn reading_set(entry: &CacheEntry, source: ReadingSource) -> ReadingSet {
        let readings = entry
            .payload
            .iter()
            .map(|(station, reading)| (station.clone(), AqiReading::new(station, reading, source)))
            .collect();
        ReadingSet {
            readings,
            source,
        }
    }
}
