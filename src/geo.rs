pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Validate latitude and longitude coordinates
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("Invalid latitude: {}. Must be between -90 and 90", lat));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("Invalid longitude: {}. Must be between -180 and 180", lon));
    }
    Ok(())
}

/// Calculate distance between two coordinates using Haversine formula
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // rounding can push `a` just past 1.0 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Round to specified decimal places
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let multiplier = 10_f64.powi(decimals as i32);
    (value * multiplier).round() / multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(0.0, 0.0).is_ok());
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(100.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, 181.0).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_haversine_distance() {
        // Lahore to Karachi is roughly 1030 km
        let distance = haversine_distance(31.5204, 74.3587, 24.8607, 67.0011);
        assert!((distance - 1030.0).abs() < 30.0);
    }

    #[test]
    fn test_identical_points_are_zero() {
        for &(lat, lon) in &[(0.0, 0.0), (31.5204, 74.3587), (-89.9, 179.9), (90.0, -180.0)] {
            assert!(haversine_distance(lat, lon, lat, lon).abs() < 1e-9);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            ((31.5204, 74.3587), (33.5970, 73.0530)),
            ((-33.8688, 151.2093), (51.5074, -0.1278)),
            ((10.0, -170.0), (-10.0, 170.0)),
        ];
        for ((lat1, lon1), (lat2, lon2)) in pairs {
            let ab = haversine_distance(lat1, lon1, lat2, lon2);
            let ba = haversine_distance(lat2, lon2, lat1, lon1);
            assert!((ab - ba).abs() < 1e-9);
            assert!(ab >= 0.0);
        }
    }

    #[test]
    fn test_antipodal_points() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        let distance = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!((distance - half_circumference).abs() < 1e-6);

        let distance = haversine_distance(31.5, 74.3, -31.5, -105.7);
        assert!(!distance.is_nan());
        assert!((distance - half_circumference).abs() < 1.0);
    }

    #[test]
    fn test_round_to_decimals() {
        assert_eq!(round_to_decimals(1.23456, 2), 1.23);
        assert_eq!(round_to_decimals(1.235, 1), 1.2);
    }
}
