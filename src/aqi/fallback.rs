use std::collections::BTreeMap;

use super::types::StationReading;

// station, AQI, dominant pollutant, observed at
const LAST_KNOWN_GOOD: &[(&str, u32, &str, &str)] = &[
    ("LHR-Punjab University", 168, "PM2.5", "2025-10-14 09:00"),
    ("LHR-Town Hall", 182, "PM2.5", "2025-10-14 09:00"),
    ("LHR-Gulberg", 176, "PM2.5", "2025-10-14 09:00"),
    ("LHR-Shahdara", 195, "PM10", "2025-10-14 09:00"),
    ("LHR-Kahna Nau", 161, "PM2.5", "2025-10-14 09:00"),
    ("LHR-Model Town", 171, "PM2.5", "2025-10-14 09:00"),
    ("LHR-Johar Town", 158, "PM2.5", "2025-10-14 09:00"),
    ("LHR-Mahmood Booti", 204, "PM10", "2025-10-14 09:00"),
    ("LHR-Allama Iqbal Town", 166, "PM2.5", "2025-10-14 09:00"),
    ("LHR-DHA Phase 5", 149, "PM2.5", "2025-10-14 09:00"),
    ("Faisalabad-GC University", 152, "PM2.5", "2025-10-14 09:00"),
    ("Faisalabad-Jhang Road", 147, "PM10", "2025-10-14 09:00"),
    ("Faisalabad-Millat Chowk", 139, "PM2.5", "2025-10-14 09:00"),
    ("Multan-Bosan Road", 131, "PM10", "2025-10-14 09:00"),
    ("Multan-Nishtar Hospital", 144, "PM2.5", "2025-10-14 09:00"),
    ("Rawalpindi-Saddar", 97, "PM2.5", "2025-10-14 09:00"),
    ("Rawalpindi-Faizabad", 88, "NO2", "2025-10-14 09:00"),
    ("Gujranwala-GT Road", 163, "PM2.5", "2025-10-14 09:00"),
    ("Gujranwala-Satellite Town", 155, "PM2.5", "2025-10-14 09:00"),
    ("Sialkot-Cantt", 121, "PM2.5", "2025-10-14 09:00"),
    ("Sargodha-University Road", 112, "PM10", "2025-10-14 09:00"),
    ("Bahawalpur-Islamia University", 118, "PM10", "2025-10-14 09:00"),
    ("Sheikhupura-Lahore Road", 170, "PM2.5", "2025-10-14 09:00"),
];

/// Last-known-good readings served when neither the upstream nor the cache can answer.
/// Not every station has an entry.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    readings: BTreeMap<String, StationReading>,
}

impl FallbackTable {
    pub fn builtin() -> Self {
        let readings = LAST_KNOWN_GOOD
            .iter()
            .map(|&(station, aqi, pollutant, observed_at)| {
                (
                    station.to_string(),
                    StationReading {
                        aqi,
                        reported_category: None,
                        dominant_pollutant: Some(pollutant.to_string()),
                        observed_at: Some(observed_at.to_string()),
                    },
                )
            })
            .collect();
        Self { readings }
    }

    pub fn get(&self, station: &str) -> Option<&StationReading> {
        self.readings.get(station)
    }

    pub fn readings(&self) -> &BTreeMap<String, StationReading> {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
