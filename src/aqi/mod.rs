pub mod cache;
pub mod epa;
pub mod fallback;
pub mod gateway;
pub mod mock;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Unexpected response: {0}")]
    Parse(#[from] types::ParseError),
}

/// Transport for the upstream AQI provider. Implementations return the raw JSON body;
/// classification into known shapes happens in [`types::classify_aqi_payload`].
#[async_trait]
pub trait AqiSource: Send + Sync {
    /// `GET /aqi`, every station.
    async fn fetch_all(&self) -> Result<Value, UpstreamError>;

    /// `GET /aqi/{station}`.
    async fn fetch_station(&self, station: &str) -> Result<Value, UpstreamError>;
}
