use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{AqiSource, UpstreamError};
use crate::config::Config;

/// Client for the Punjab EPA air quality API.
pub struct EpaClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl EpaClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let timeout = config.upstream_timeout();
        let client = Client::builder()
            .user_agent("AqiWebhook/1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.epa_api_base.clone(),
            api_key: config.epa_api_key.clone(),
            timeout,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// `GET /coordinates`, `{ "<station>": { "lat": .., "lng": .. } }`.
    pub async fn fetch_coordinates(&self) -> Result<Value, UpstreamError> {
        self.get_json("/coordinates").await
    }

    async fn get_json(&self, path: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        match response.status() {
            status if status.is_success() => {
                let json: Value = response.json().await.map_err(|e| self.classify(e))?;
                Ok(json)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(UpstreamError::ApiError(format!(
                    "HTTP {} from {}: {}",
                    status, path, error_text
                )))
            }
        }
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.timeout.as_secs())
        } else {
            UpstreamError::RequestFailed(error)
        }
    }
}

#[async_trait]
impl AqiSource for EpaClient {
    async fn fetch_all(&self) -> Result<Value, UpstreamError> {
        self.get_json("/aqi").await
    }

    async fn fetch_station(&self, station: &str) -> Result<Value, UpstreamError> {
        self.get_json(&format!("/aqi/{}", urlencoding::encode(station)))
            .await
    }
}
