use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{AqiSource, UpstreamError};
use crate::stations::StationDirectory;

/// In-process stand-in for the EPA API. Serves a fixed `/aqi` body, can be switched into a
/// failing mode, and counts every call it receives.
pub struct MockAqiSource {
    readings: Map<String, Value>,
    failing: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAqiSource {
    pub fn new() -> Self {
        Self {
            readings: Map::new(),
            failing: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Plausible readings for every station in the directory, for local development.
    pub fn synthetic(directory: &StationDirectory) -> Self {
        let observed_at = Utc::now().format("%Y-%m-%d %H:00").to_string();
        let pollutants = ["PM2.5", "PM10", "NO2", "O3"];

        let mut mock = Self::new();
        for station in directory.stations() {
            let aqi = 60 + fastrand::u32(0..200);
            mock.readings.insert(
                station.name.clone(),
                json!({
                    "AQI": aqi,
                    "Dominant_Pollutant": pollutants[fastrand::usize(0..pollutants.len())],
                    "Date_Time": observed_at,
                }),
            );
        }
        mock
    }

    #[cfg(test)]
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_failing(true);
        mock
    }

    #[cfg(test)]
    pub fn with_reading(mut self, station: &str, aqi: u32) -> Self {
        self.readings.insert(
            station.to_string(),
            json!({
                "AQI": aqi,
                "Dominant_Pollutant": "PM2.5",
                "Date_Time": "2025-10-14 10:00",
            }),
        );
        self
    }

    #[cfg(test)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[cfg(test)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond<F>(&self, body: F) -> Result<Value, UpstreamError>
    where
        F: FnOnce(&Map<String, Value>) -> Value,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Timeout(10));
        }
        Ok(body(&self.readings))
    }
}

impl Default for MockAqiSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AqiSource for MockAqiSource {
    async fn fetch_all(&self) -> Result<Value, UpstreamError> {
        self.respond(|readings| Value::Object(readings.clone())).await
    }

    async fn fetch_station(&self, station: &str) -> Result<Value, UpstreamError> {
        self.respond(|readings| {
            readings
                .get(station)
                .cloned()
                .unwrap_or_else(|| json!({ "error": format!("No data for station {}", station) }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_covers_directory() {
        let directory = StationDirectory::builtin();
        let mock = MockAqiSource::synthetic(&directory);

        let body = mock.fetch_all().await.unwrap();
        assert_eq!(body.as_object().unwrap().len(), directory.len());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let mock = MockAqiSource::new().with_reading("LHR-Gulberg", 80);
        assert!(mock.fetch_station("LHR-Gulberg").await.is_ok());

        mock.set_failing(true);
        assert!(matches!(
            mock.fetch_station("LHR-Gulberg").await,
            Err(UpstreamError::Timeout(_))
        ));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_station_returns_error_body() {
        let mock = MockAqiSource::new();
        let body = mock.fetch_station("Nowhere").await.unwrap();
        assert!(body.get("error").is_some());
    }
}
