use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geo::{haversine_distance, validate_coordinates};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Station directory is empty")]
    EmptyDirectory,
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("No station within {max_radius_km} km")]
    NoNearbyStation {
        nearest: NearestStation,
        max_radius_km: f64,
    },
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Coordinates payload is not an object")]
    NotAnObject,
    #[error("Coordinates payload contained no usable stations")]
    NoStations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestStation {
    pub station: Station,
    pub distance_km: f64,
}

/// City name to the substring its station names carry upstream.
pub const CITY_PATTERNS: &[(&str, &str)] = &[
    ("Lahore", "LHR"),
    ("Faisalabad", "Faisalabad"),
    ("Multan", "Multan"),
    ("Rawalpindi", "Rawalpindi"),
    ("Gujranwala", "Gujranwala"),
    ("Sialkot", "Sialkot"),
    ("Sargodha", "Sargodha"),
    ("Bahawalpur", "Bahawalpur"),
    ("Sheikhupura", "Sheikhupura"),
    ("D.G. Khan", "DG Khan"),
    ("DG Khan", "DG Khan"),
];

pub fn city_pattern(city: &str) -> Option<&'static str> {
    let city = city.trim();
    CITY_PATTERNS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(city))
        .map(|(_, pattern)| *pattern)
}

/// Best-effort city for an upstream station name such as `LHR-Gulberg` or `Multan-Bosan Road`.
pub fn city_for_station_name(name: &str) -> Option<String> {
    if let Some((city, _)) = CITY_PATTERNS
        .iter()
        .find(|(_, pattern)| name.contains(pattern))
    {
        return Some(city.to_string());
    }
    name.split('-')
        .next()
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty() && *prefix != name)
        .map(str::to_string)
}

// name, lat, lon, city
const BUILTIN_STATIONS: &[(&str, f64, f64, &str)] = &[
    ("LHR-Punjab University", 31.4812, 74.3034, "Lahore"),
    ("LHR-Town Hall", 31.5717, 74.3125, "Lahore"),
    ("LHR-Gulberg", 31.5120, 74.3440, "Lahore"),
    ("LHR-Shahdara", 31.6246, 74.2830, "Lahore"),
    ("LHR-Kahna Nau", 31.3700, 74.3667, "Lahore"),
    ("LHR-Model Town", 31.4830, 74.3240, "Lahore"),
    ("LHR-Johar Town", 31.4697, 74.2728, "Lahore"),
    ("LHR-Mahmood Booti", 31.6000, 74.3900, "Lahore"),
    ("LHR-Allama Iqbal Town", 31.5080, 74.2880, "Lahore"),
    ("LHR-DHA Phase 5", 31.4630, 74.4100, "Lahore"),
    ("Faisalabad-GC University", 31.4166, 73.0700, "Faisalabad"),
    ("Faisalabad-Jhang Road", 31.4100, 73.0300, "Faisalabad"),
    ("Faisalabad-Millat Chowk", 31.4380, 73.1120, "Faisalabad"),
    ("Multan-Bosan Road", 30.2200, 71.4700, "Multan"),
    ("Multan-Nishtar Hospital", 30.2020, 71.4350, "Multan"),
    ("Rawalpindi-Saddar", 33.5970, 73.0530, "Rawalpindi"),
    ("Rawalpindi-Faizabad", 33.6630, 73.0850, "Rawalpindi"),
    ("Gujranwala-GT Road", 32.1617, 74.1883, "Gujranwala"),
    ("Gujranwala-Satellite Town", 32.1800, 74.1700, "Gujranwala"),
    ("Sialkot-Cantt", 32.5050, 74.5350, "Sialkot"),
    ("Sialkot-Daska Road", 32.4720, 74.5100, "Sialkot"),
    ("Sargodha-University Road", 32.0740, 72.6860, "Sargodha"),
    ("Bahawalpur-Islamia University", 29.3760, 71.7630, "Bahawalpur"),
    ("Sheikhupura-Lahore Road", 31.7130, 73.9850, "Sheikhupura"),
    ("DG Khan-Block 17", 30.0560, 70.6350, "D.G. Khan"),
    ("Okara-Depalpur Road", 30.8100, 73.4450, "Okara"),
    ("Sahiwal-Farid Town", 30.6680, 73.1060, "Sahiwal"),
    ("Kasur-Ferozpur Road", 31.1160, 74.4470, "Kasur"),
    ("Rahim Yar Khan-Abu Dhabi Road", 28.4200, 70.3000, "Rahim Yar Khan"),
    ("Gujrat-Jalalpur Road", 32.5740, 74.0780, "Gujrat"),
];

#[derive(Debug, Clone)]
pub struct StationDirectory {
    stations: Vec<Station>,
}

impl StationDirectory {
    pub fn builtin() -> Self {
        let stations = BUILTIN_STATIONS
            .iter()
            .map(|&(name, lat, lon, city)| Station {
                name: name.to_string(),
                lat,
                lon,
                city: Some(city.to_string()),
            })
            .collect();
        Self { stations }
    }

    /// Build a directory from the upstream `/coordinates` body, `{ "<name>": {lat, lng} }`.
    ///
    /// Entries without valid coordinates are skipped.
    pub fn from_coordinates_payload(payload: &Value) -> Result<Self, DirectoryError> {
        let object = payload.as_object().ok_or(DirectoryError::NotAnObject)?;

        let stations: Vec<Station> = object
            .iter()
            .filter_map(|(name, coords)| {
                let lat = coords.get("lat").and_then(Value::as_f64)?;
                let lon = coords
                    .get("lng")
                    .or_else(|| coords.get("lon"))
                    .and_then(Value::as_f64)?;
                if let Err(e) = validate_coordinates(lat, lon) {
                    tracing::warn!("Skipping station {}: {}", name, e);
                    return None;
                }
                Some(Station {
                    name: name.clone(),
                    lat,
                    lon,
                    city: city_for_station_name(name),
                })
            })
            .collect();

        if stations.is_empty() {
            return Err(DirectoryError::NoStations);
        }
        Ok(Self { stations })
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.name == name)
    }
}

/// Find the station closest to the given point.
///
/// Ties resolve to the first station in directory order. When `max_radius_km` is set and
/// the closest station lies beyond it, the match is rejected with
/// [`ResolveError::NoNearbyStation`].
pub fn resolve_nearest(
    lat: f64,
    lon: f64,
    stations: &[Station],
    max_radius_km: Option<f64>,
) -> Result<NearestStation, ResolveError> {
    validate_coordinates(lat, lon).map_err(ResolveError::InvalidCoordinates)?;

    let mut closest: Option<(&Station, f64)> = None;
    for station in stations {
        let distance = haversine_distance(lat, lon, station.lat, station.lon);
        match closest {
            Some((_, best)) if distance >= best => {}
            _ => closest = Some((station, distance)),
        }
    }

    let (station, distance_km) = closest.ok_or(ResolveError::EmptyDirectory)?;
    let nearest = NearestStation {
        station: station.clone(),
        distance_km,
    };

    match max_radius_km {
        Some(max_radius_km) if distance_km > max_radius_km => Err(ResolveError::NoNearbyStation {
            nearest,
            max_radius_km,
        }),
        _ => Ok(nearest),
    }
}

/// The `limit` closest stations, nearest first.
pub fn nearest_candidates(lat: f64, lon: f64, stations: &[Station], limit: usize) -> Vec<NearestStation> {
    let mut ranked: Vec<NearestStation> = stations
        .iter()
        .map(|station| NearestStation {
            station: station.clone(),
            distance_km: haversine_distance(lat, lon, station.lat, station.lon),
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(limit);
    ranked
}
