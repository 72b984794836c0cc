use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::geo::validate_coordinates;

#[derive(Error, Debug)]
pub enum BotSailorError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("BotSailor API key not configured")]
    NoApiKey,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("No GPS location found in conversation")]
    NoLocationFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub address: Option<String>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFromUser,
    InvalidJson,
    NoMessageEvent,
    NotALocation,
    MissingCoordinates,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEntry {
    Parsed(SharedLocation),
    Skipped { id: String, reason: SkipReason },
}

/// Fetches the raw conversation history for a subscriber.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    async fn load_conversation(&self, subscriber_id: &str) -> Result<Value, BotSailorError>;
}

pub struct BotSailorClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    bot_id: String,
}

impl BotSailorClient {
    pub fn new(config: &Config) -> Result<Self, BotSailorError> {
        let client = Client::builder()
            .user_agent("AqiWebhook/1.0")
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.botsailor_api_base.clone(),
            api_key: config.botsailor_api_key.clone(),
            bot_id: config.botsailor_bot_id.clone(),
        })
    }
}

#[async_trait]
impl ConversationSource for BotSailorClient {
    async fn load_conversation(&self, subscriber_id: &str) -> Result<Value, BotSailorError> {
        let api_key = self.api_key.as_deref().ok_or(BotSailorError::NoApiKey)?;
        let url = format!("{}/api/conversation/load-conversation", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", api_key)
            .query(&[("subscriber_id", subscriber_id), ("bot_id", self.bot_id.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BotSailorError::ApiError(format!("HTTP {}: {}", status, error_text)));
        }

        Ok(response.json().await?)
    }
}

// History is `{ "message": "<JSON>" }`; each entry's `message_content` is a JSON string
// holding a WhatsApp webhook event.

/// Values that may arrive either as JSON or as a string containing JSON.
fn decode_embedded(value: &Value) -> Option<Value> {
    match value {
        Value::String(text) => serde_json::from_str(text).ok(),
        Value::Object(_) | Value::Array(_) => Some(value.clone()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Classify one history entry.
pub fn classify_entry(id: &str, entry: &Value) -> ScanEntry {
    let skipped = |reason| ScanEntry::Skipped {
        id: id.to_string(),
        reason,
    };

    if let Some(sender) = entry.get("sender").and_then(Value::as_str) {
        if sender != "user" {
            return skipped(SkipReason::NotFromUser);
        }
    }

    let Some(content) = entry.get("message_content").and_then(decode_embedded) else {
        return skipped(SkipReason::InvalidJson);
    };

    let Some(message) = content.pointer("/entry/0/changes/0/value/messages/0") else {
        return skipped(SkipReason::NoMessageEvent);
    };

    if let Some(kind) = message.get("type").and_then(Value::as_str) {
        if kind != "location" {
            return skipped(SkipReason::NotALocation);
        }
    }

    let Some(location) = message.get("location").filter(|l| l.is_object()) else {
        return skipped(SkipReason::NotALocation);
    };

    let latitude = location.get("latitude").and_then(as_number);
    let longitude = location.get("longitude").and_then(as_number);
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return skipped(SkipReason::MissingCoordinates);
    };
    if validate_coordinates(latitude, longitude).is_err() {
        return skipped(SkipReason::MissingCoordinates);
    }

    ScanEntry::Parsed(SharedLocation {
        latitude,
        longitude,
        name: non_empty_string(location.get("name")),
        address: non_empty_string(location.get("address")),
        timestamp: message.get("timestamp").and_then(as_number).map(|t| t as i64),
    })
}

/// Classify every entry of a `load-conversation` body, in history order.
pub fn scan_conversation(payload: &Value) -> Vec<ScanEntry> {
    let Some(history) = payload.get("message").and_then(decode_embedded) else {
        return Vec::new();
    };

    match history {
        Value::Object(map) => {
            // integer ids are message sequence numbers; order them numerically, the rest after
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(id, _)| match id.parse::<u64>() {
                Ok(n) => (0, n),
                Err(_) => (1, 0),
            });
            entries
                .into_iter()
                .map(|(id, entry)| classify_entry(id, entry))
                .collect()
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, entry)| classify_entry(&i.to_string(), entry))
            .collect(),
        _ => Vec::new(),
    }
}

/// The most recently shared location in a conversation.
///
/// Timestamped candidates outrank untimestamped ones; among equals the later entry wins.
pub fn extract_latest_location(payload: &Value) -> Result<SharedLocation, LocationError> {
    let mut best: Option<SharedLocation> = None;

    for entry in scan_conversation(payload) {
        match entry {
            ScanEntry::Parsed(candidate) => {
                let replace = match &best {
                    None => true,
                    Some(current) => candidate.timestamp >= current.timestamp,
                };
                if replace {
                    best = Some(candidate);
                }
            }
            ScanEntry::Skipped { id, reason } => {
                tracing::trace!("Skipping conversation entry {}: {:?}", id, reason);
            }
        }
    }

    best.ok_or(LocationError::NoLocationFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location_content(lat: f64, lon: f64, timestamp: &str) -> String {
        json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "type": "location",
                            "timestamp": timestamp,
                            "location": { "latitude": lat, "longitude": lon, "name": "Home" }
                        }]
                    }
                }]
            }]
        })
        .to_string()
    }

    fn text_content(body: &str) -> String {
        json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "type": "text", "timestamp": "1700000300", "text": { "body": body }
            }]}}]}]
        })
        .to_string()
    }

    fn conversation(entries: Value) -> Value {
        json!({ "message": entries.to_string() })
    }

    #[test]
    fn test_latest_timestamp_wins_over_scan_order() {
        let payload = conversation(json!({
            "1": { "sender": "user", "message_content": location_content(31.52, 74.35, "1700000200") },
            "2": { "sender": "user", "message_content": location_content(30.20, 71.43, "1700000100") },
            "3": { "sender": "user", "message_content": text_content("hello") }
        }));

        let location = extract_latest_location(&payload).unwrap();
        assert_eq!(location.latitude, 31.52);
        assert_eq!(location.longitude, 74.35);
        assert_eq!(location.timestamp, Some(1700000200));
        assert_eq!(location.name.as_deref(), Some("Home"));
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let payload = conversation(json!({
            "1": { "sender": "user", "message_content": "{not json" },
            "2": { "sender": "bot", "message_content": location_content(1.0, 1.0, "1700000900") },
            "3": { "sender": "user", "message_content": location_content(31.52, 74.35, "1700000200") },
            "4": { "sender": "user" }
        }));

        let scan = scan_conversation(&payload);
        assert_eq!(scan.len(), 4);
        assert!(matches!(scan[0], ScanEntry::Skipped { reason: SkipReason::InvalidJson, .. }));
        assert!(matches!(scan[1], ScanEntry::Skipped { reason: SkipReason::NotFromUser, .. }));
        assert!(matches!(scan[2], ScanEntry::Parsed(_)));
        assert!(matches!(scan[3], ScanEntry::Skipped { reason: SkipReason::InvalidJson, .. }));

        let location = extract_latest_location(&payload).unwrap();
        assert_eq!(location.latitude, 31.52);
    }

    #[test]
    fn test_no_location_found() {
        let payload = conversation(json!({
            "1": { "sender": "user", "message_content": text_content("hi") }
        }));
        assert_eq!(extract_latest_location(&payload), Err(LocationError::NoLocationFound));

        assert_eq!(
            extract_latest_location(&json!({ "message": "garbage" })),
            Err(LocationError::NoLocationFound)
        );
        assert_eq!(extract_latest_location(&json!({})), Err(LocationError::NoLocationFound));
    }

    #[test]
    fn test_string_coordinates_and_missing_timestamps() {
        let untimestamped = json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "location": { "latitude": "33.597", "longitude": "73.053" }
            }]}}]}]
        });
        let history = json!([
            { "sender": "user", "message_content": untimestamped.clone() },
            { "sender": "user", "message_content": location_content(31.52, 74.35, "1700000200") },
            { "sender": "user", "message_content": untimestamped }
        ]);

        // a timestamped candidate beats untimestamped ones regardless of position
        let location = extract_latest_location(&json!({ "message": history })).unwrap();
        assert_eq!(location.latitude, 31.52);

        let only_untimestamped = json!({
            "message": [{ "sender": "user", "message_content": {
                "entry": [{ "changes": [{ "value": { "messages": [{
                    "location": { "latitude": "33.597", "longitude": "73.053" }
                }]}}]}]
            }}]
        });
        let location = extract_latest_location(&only_untimestamped).unwrap();
        assert_eq!(location.latitude, 33.597);
        assert_eq!(location.timestamp, None);
    }

    #[test]
    fn test_numeric_ids_scan_in_numeric_order() {
        let mut history = serde_json::Map::new();
        for i in 1..=10 {
            let content = json!({
                "entry": [{ "changes": [{ "value": { "messages": [{
                    "type": "location",
                    "location": { "latitude": 30.0 + i as f64 / 100.0, "longitude": 71.4 }
                }]}}]}]
            });
            history.insert(
                i.to_string(),
                json!({ "sender": "user", "message_content": content.to_string() }),
            );
        }
        let payload = conversation(Value::Object(history));

        let ids: Vec<String> = scan_conversation(&payload)
            .into_iter()
            .map(|entry| match entry {
                ScanEntry::Parsed(location) => format!("{:.2}", location.latitude),
                ScanEntry::Skipped { id, .. } => id,
            })
            .collect();
        assert_eq!(ids.first().map(String::as_str), Some("30.01"));
        assert_eq!(ids.last().map(String::as_str), Some("30.10"));

        let location = extract_latest_location(&payload).unwrap();
        assert_eq!(location.latitude, 30.1);
    }

    #[test]
    fn test_out_of_range_location_is_skipped() {
        let payload = conversation(json!({
            "1": { "sender": "user", "message_content": location_content(123.0, 74.0, "1700000200") }
        }));
        let scan = scan_conversation(&payload);
        assert!(matches!(
            scan[0],
            ScanEntry::Skipped { reason: SkipReason::MissingCoordinates, .. }
        ));
    }
}
