use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::advisory::advise;
use crate::aqi::types::{AqiReading, ReadingSource};
use crate::geo::round_to_decimals;
use crate::stations::NearestStation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiReport {
    pub success: bool,
    pub message: String,
    pub station_name: String,
    pub city: Option<String>,
    pub distance_km: f64,
    pub aqi: u32,
    pub category: String,
    pub dominant_pollutant: Option<String>,
    pub timestamp: String,
    pub health_advice: String,
    pub source: ReadingSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityStation {
    pub name: String,
    pub aqi: u32,
    pub category: String,
    pub reported_category: Option<String>,
    pub pollutant: Option<String>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityReport {
    pub success: bool,
    pub message: String,
    pub city: String,
    pub average_aqi: u32,
    pub category: String,
    pub health_advice: String,
    pub stations_count: usize,
    pub stations: Vec<CityStation>,
    pub source: ReadingSource,
}

pub fn format_timestamp(now: DateTime<Utc>, timezone: Tz) -> String {
    now.with_timezone(&timezone).format("%Y-%m-%d %H:%M").to_string()
}

fn freshness_note(source: ReadingSource) -> Option<&'static str> {
    match source {
        ReadingSource::Api | ReadingSource::Cache => None,
        ReadingSource::StaleCache | ReadingSource::Fallback => {
            Some("Live data is temporarily unavailable, showing the last known reading.")
        }
    }
}

pub fn format_report(
    nearest: &NearestStation,
    reading: &AqiReading,
    timezone: Tz,
    now: DateTime<Utc>,
) -> AqiReport {
    let advisory = advise(reading.aqi);
    let distance_km = round_to_decimals(nearest.distance_km, 2);
    let timestamp = reading
        .observed_at
        .clone()
        .unwrap_or_else(|| format_timestamp(now, timezone));

    let station_label = match &nearest.station.city {
        Some(city) => format!("{} ({})", nearest.station.name, city),
        None => nearest.station.name.clone(),
    };

    let mut lines = vec![
        "Air Quality Update".to_string(),
        format!("Nearest station: {}, {:.1} km away", station_label, distance_km),
        format!("AQI: {} ({})", reading.aqi, advisory.category),
    ];
    if let Some(pollutant) = &reading.dominant_pollutant {
        lines.push(format!("Main pollutant: {}", pollutant));
    }
    lines.push(format!("Updated: {}", timestamp));
    lines.push(format!("Advice: {}", advisory.message));
    if let Some(note) = freshness_note(reading.source) {
        lines.push(note.to_string());
    }

    AqiReport {
        success: true,
        message: lines.join("\n"),
        station_name: nearest.station.name.clone(),
        city: nearest.station.city.clone(),
        distance_km,
        aqi: reading.aqi,
        category: advisory.category.to_string(),
        dominant_pollutant: reading.dominant_pollutant.clone(),
        timestamp,
        health_advice: advisory.message.to_string(),
        source: reading.source,
    }
}

/// Summarise a city's stations. Returns `None` when there are no readings to average.
pub fn format_city_report(city: &str, readings: &[&AqiReading], source: ReadingSource) -> Option<CityReport> {
    if readings.is_empty() {
        return None;
    }

    let total: u64 = readings.iter().map(|r| u64::from(r.aqi)).sum();
    let average_aqi = (total as f64 / readings.len() as f64).round() as u32;
    let advisory = advise(average_aqi);

    let stations = readings
        .iter()
        .map(|r| CityStation {
            name: r.station.clone(),
            aqi: r.aqi,
            category: r.category.clone(),
            reported_category: r.reported_category.clone(),
            pollutant: r.dominant_pollutant.clone(),
            last_updated: r.observed_at.clone(),
        })
        .collect::<Vec<_>>();

    let mut message = format!(
        "{} average AQI: {} ({}) across {} stations\nAdvice: {}",
        city,
        average_aqi,
        advisory.category,
        stations.len(),
        advisory.message
    );
    if let Some(note) = freshness_note(source) {
        message.push('\n');
        message.push_str(note);
    }

    Some(CityReport {
        success: true,
        message,
        city: city.to_string(),
        average_aqi,
        category: advisory.category.to_string(),
        health_advice: advisory.message.to_string(),
        stations_count: stations.len(),
        stations,
        source,
    })
}

pub fn no_location_message() -> String {
    "We couldn't find a shared location in this chat. Please share your location first, then try again."
        .to_string()
}

pub fn no_nearby_station_message(candidates: &[NearestStation], max_radius_km: f64) -> String {
    let mut message = format!(
        "There is no air quality monitoring station within {} km of your location.",
        max_radius_km
    );
    if !candidates.is_empty() {
        message.push_str(" Closest stations:");
        for candidate in candidates {
            message.push_str(&format!(
                "\n- {} ({:.1} km)",
                candidate.station.name, candidate.distance_km
            ));
        }
    }
    message
}

pub fn unavailable_message(subject: &str, helpline: &str) -> String {
    format!(
        "Air quality data for {} is temporarily unavailable. Please try again later or call the EPA helpline at {}.",
        subject, helpline
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stations::Station;
    use chrono::TimeZone;

    fn nearest() -> NearestStation {
        NearestStation {
            station: Station {
                name: "LHR-Gulberg".to_string(),
                lat: 31.512,
                lon: 74.344,
                city: Some("Lahore".to_string()),
            },
            distance_km: 1.6789,
        }
    }

    fn reading(aqi: u32, source: ReadingSource, observed_at: Option<&str>) -> AqiReading {
        AqiReading {
            station: "LHR-Gulberg".to_string(),
            aqi,
            category: advise(aqi).category.to_string(),
            reported_category: None,
            dominant_pollutant: Some("PM2.5".to_string()),
            observed_at: observed_at.map(str::to_string),
            source,
        }
    }

    pub(crate) fn sample_report() -> AqiReport {
        format_report(
            &nearest(),
            &reading(172, ReadingSource::Api, Some("2025-10-14 09:00")),
            chrono_tz::Asia::Karachi,
            Utc::now(),
        )
    }

    #[test]
    fn test_report_fields() {
        let report = sample_report();
        assert!(report.success);
        assert_eq!(report.station_name, "LHR-Gulberg");
        assert_eq!(report.city.as_deref(), Some("Lahore"));
        assert_eq!(report.distance_km, 1.68);
        assert_eq!(report.category, "Unhealthy");
        assert_eq!(report.timestamp, "2025-10-14 09:00");
        assert!(report.message.contains("AQI: 172 (Unhealthy)"));
        assert!(report.message.contains("LHR-Gulberg (Lahore), 1.7 km away"));
        assert!(report.message.contains("Main pollutant: PM2.5"));
        assert!(!report.message.contains("temporarily unavailable"));
    }

    #[test]
    fn test_fallback_report_carries_note_and_local_time() {
        let now = Utc.with_ymd_and_hms(2025, 10, 14, 4, 30, 0).unwrap();
        let report = format_report(
            &nearest(),
            &reading(90, ReadingSource::Fallback, None),
            chrono_tz::Asia::Karachi,
            now,
        );
        assert_eq!(report.source, ReadingSource::Fallback);
        // Karachi is UTC+5
        assert_eq!(report.timestamp, "2025-10-14 09:30");
        assert!(report.message.contains("last known reading"));
    }

    #[test]
    fn test_city_report_average() {
        let readings = [
            reading(150, ReadingSource::Cache, None),
            reading(152, ReadingSource::Cache, None),
            reading(160, ReadingSource::Cache, None),
        ];
        let refs: Vec<&AqiReading> = readings.iter().collect();

        let report = format_city_report("Lahore", &refs, ReadingSource::Cache).unwrap();
        assert_eq!(report.average_aqi, 154);
        assert_eq!(report.category, "Unhealthy");
        assert_eq!(report.stations_count, 3);

        assert!(format_city_report("Lahore", &[], ReadingSource::Cache).is_none());
    }

    #[test]
    fn test_no_nearby_station_message_lists_candidates() {
        let message = no_nearby_station_message(&[nearest()], 20.0);
        assert!(message.contains("within 20 km"));
        assert!(message.contains("- LHR-Gulberg (1.7 km)"));
    }
}
