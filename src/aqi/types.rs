use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::advisory::{advise, normalize_aqi};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Response body is not a JSON object")]
    NotAnObject,
    #[error("Reading has no numeric AQI")]
    MissingAqi,
    #[error("Response contained no usable readings")]
    NoReadings,
    #[error("No reading for station {0}")]
    MissingStation(String),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
}

/// Which retrieval tier supplied a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Api,
    Cache,
    StaleCache,
    Fallback,
}

/// A station reading exactly as the upstream serialises it.
#[derive(Debug, Clone, Deserialize)]
struct RawReading {
    #[serde(rename = "AQI", default, deserialize_with = "deserialize_aqi")]
    aqi: Option<f64>,
    #[serde(rename = "AQI_category", default)]
    category: Option<String>,
    #[serde(rename = "Dominant_Pollutant", default)]
    dominant_pollutant: Option<String>,
    #[serde(rename = "Date_Time", default)]
    date_time: Option<String>,
}

/// The upstream sends AQI as a number, a numeric string, `"N/A"` or null.
fn deserialize_aqi<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct AqiVisitor;

    impl<'de> Visitor<'de> for AqiVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, a numeric string or null")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Option<f64>, E> {
            Ok(Some(value as f64))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Option<f64>, E> {
            Ok(Some(value as f64))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Option<f64>, E> {
            Ok(Some(value))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Option<f64>, E> {
            Ok(value.trim().parse::<f64>().ok())
        }

        fn visit_none<E: de::Error>(self) -> Result<Option<f64>, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<f64>, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(AqiVisitor)
}

/// A validated reading for one station, as held in the cache and the fallback table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationReading {
    pub aqi: u32,
    pub reported_category: Option<String>,
    pub dominant_pollutant: Option<String>,
    pub observed_at: Option<String>,
}

fn validate_reading(raw: RawReading) -> Result<StationReading, ParseError> {
    let aqi = raw.aqi.and_then(normalize_aqi).ok_or(ParseError::MissingAqi)?;
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty() && v != "N/A");
    Ok(StationReading {
        aqi,
        reported_category: non_empty(raw.category),
        dominant_pollutant: non_empty(raw.dominant_pollutant),
        observed_at: non_empty(raw.date_time),
    })
}

/// The shapes an `/aqi` style response is known to take.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    /// `{ "<station>": { "AQI": .. }, .. }`
    Keyed(BTreeMap<String, StationReading>),
    /// `{ "AQI": .., "AQI_category": .. }` already scoped to one station.
    Flat(StationReading),
    /// `{ "error": "..." }`
    Error(String),
}

/// Classify an upstream AQI body. All shape sniffing for the AQI endpoints lives here.
///
/// Keyed entries that cannot be parsed are dropped individually; a keyed body with no
/// usable entries is an error.
pub fn classify_aqi_payload(body: Value) -> Result<UpstreamPayload, ParseError> {
    let Value::Object(object) = body else {
        return Err(ParseError::NotAnObject);
    };

    if object.contains_key("AQI") {
        let raw: RawReading = serde_json::from_value(Value::Object(object))?;
        return Ok(UpstreamPayload::Flat(validate_reading(raw)?));
    }

    if let Some(error) = object.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Ok(UpstreamPayload::Error(message));
    }

    let mut readings = BTreeMap::new();
    for (station, value) in object {
        if !value.is_object() {
            tracing::debug!("Ignoring non-object entry for {}", station);
            continue;
        }
        let parsed = serde_json::from_value::<RawReading>(value)
            .map_err(ParseError::from)
            .and_then(validate_reading);
        match parsed {
            Ok(reading) => {
                readings.insert(station, reading);
            }
            Err(e) => tracing::warn!("Dropping reading for {}: {}", station, e),
        }
    }

    if readings.is_empty() {
        return Err(ParseError::NoReadings);
    }
    Ok(UpstreamPayload::Keyed(readings))
}

/// A reading as returned to callers, tagged with the tier that supplied it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiReading {
    pub station: String,
    pub aqi: u32,
    pub category: String,
    pub reported_category: Option<String>,
    pub dominant_pollutant: Option<String>,
    pub observed_at: Option<String>,
    pub source: ReadingSource,
}

impl AqiReading {
    pub fn new(station: &str, reading: &StationReading, source: ReadingSource) -> Self {
        Self {
            station: station.to_string(),
            aqi: reading.aqi,
            category: advise(reading.aqi).category.to_string(),
            reported_category: reading.reported_category.clone(),
            dominant_pollutant: reading.dominant_pollutant.clone(),
            observed_at: reading.observed_at.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_payload() {
        let body = json!({
            "AQI": 172,
            "AQI_category": "Unhealthy",
            "Dominant_Pollutant": "PM2.5",
            "Date_Time": "2025-10-14 09:00"
        });

        let payload = classify_aqi_payload(body).unwrap();
        assert_eq!(
            payload,
            UpstreamPayload::Flat(StationReading {
                aqi: 172,
                reported_category: Some("Unhealthy".to_string()),
                dominant_pollutant: Some("PM2.5".to_string()),
                observed_at: Some("2025-10-14 09:00".to_string()),
            })
        );
    }

    #[test]
    fn test_keyed_payload_drops_bad_entries() {
        let body = json!({
            "LHR-Gulberg": { "AQI": "185", "AQI_category": "Unhealthy" },
            "LHR-Town Hall": { "AQI": 64.6 },
            "LHR-Shahdara": { "AQI": "N/A" },
            "metadata": "v2"
        });

        let UpstreamPayload::Keyed(readings) = classify_aqi_payload(body).unwrap() else {
            panic!("expected keyed payload");
        };
        assert_eq!(readings.len(), 2);
        assert_eq!(readings["LHR-Gulberg"].aqi, 185);
        assert_eq!(readings["LHR-Town Hall"].aqi, 65);
        assert_eq!(readings["LHR-Town Hall"].dominant_pollutant, None);
        assert_eq!(readings["LHR-Town Hall"].observed_at, None);
    }

    #[test]
    fn test_error_payload() {
        let payload = classify_aqi_payload(json!({ "error": "Station not found" })).unwrap();
        assert_eq!(payload, UpstreamPayload::Error("Station not found".to_string()));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(classify_aqi_payload(json!([1, 2])), Err(ParseError::NotAnObject)));
        assert!(matches!(classify_aqi_payload(json!("oops")), Err(ParseError::NotAnObject)));
        assert!(matches!(classify_aqi_payload(json!({})), Err(ParseError::NoReadings)));
        assert!(matches!(
            classify_aqi_payload(json!({ "AQI": null })),
            Err(ParseError::MissingAqi)
        ));
    }

    #[test]
    fn test_placeholder_fields_are_absent() {
        let body = json!({ "AQI": 40, "Dominant_Pollutant": "N/A", "Date_Time": "" });
        let UpstreamPayload::Flat(reading) = classify_aqi_payload(body).unwrap() else {
            panic!("expected flat payload");
        };
        assert_eq!(reading.dominant_pollutant, None);
        assert_eq!(reading.observed_at, None);
    }

    #[test]
    fn test_reading_category_uses_canonical_table() {
        let reading = StationReading {
            aqi: 172,
            reported_category: Some("Unhealthy for Sensitive Groups".to_string()),
            dominant_pollutant: None,
            observed_at: None,
        };
        let tagged = AqiReading::new("LHR-Gulberg", &reading, ReadingSource::Api);
        assert_eq!(tagged.category, "Unhealthy");
        assert_eq!(
            serde_json::to_value(tagged.source).unwrap(),
            json!("api")
        );
        assert_eq!(
            serde_json::to_value(ReadingSource::StaleCache).unwrap(),
            json!("stale_cache")
        );
    }
}
