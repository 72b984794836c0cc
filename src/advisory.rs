use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    /// Breakpoints are inclusive on the upper end: 50 is Good, 51 is Moderate.
    pub fn from_aqi(aqi: u32) -> Self {
        match aqi {
            0..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthyForSensitiveGroups,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Self::Good => "Air quality is good. Enjoy outdoor activities!",
            Self::Moderate => {
                "Air quality is acceptable. Unusually sensitive people should limit prolonged outdoor exertion."
            }
            Self::UnhealthyForSensitiveGroups => {
                "People with respiratory or heart conditions, children and older adults should limit outdoor activities."
            }
            Self::Unhealthy => {
                "Everyone may experience health effects. Sensitive groups should avoid outdoor activities."
            }
            Self::VeryUnhealthy => "Health alert! Everyone should avoid prolonged outdoor exertion.",
            Self::Hazardous => {
                "Health warning of emergency conditions. Everyone should avoid outdoor activities."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub category: &'static str,
    pub message: &'static str,
}

pub fn advise(aqi: u32) -> Advisory {
    let category = AqiCategory::from_aqi(aqi);
    Advisory {
        category: category.label(),
        message: category.advice(),
    }
}

/// Normalise an upstream AQI value. Negative and non-finite values are not valid readings.
pub fn normalize_aqi(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.round().min(u32::MAX as f64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(advise(0).category, "Good");
        assert_eq!(advise(50).category, "Good");
        assert_ne!(advise(51).category, "Good");
        assert_eq!(advise(100).category, "Moderate");
        assert_eq!(advise(101).category, "Unhealthy for Sensitive Groups");
        assert_eq!(advise(150).category, "Unhealthy for Sensitive Groups");
        assert_eq!(advise(151).category, "Unhealthy");
        assert_eq!(advise(172).category, "Unhealthy");
        assert_eq!(advise(200).category, "Unhealthy");
        assert_eq!(advise(201).category, "Very Unhealthy");
        assert_eq!(advise(300).category, "Very Unhealthy");
        assert_eq!(advise(301).category, "Hazardous");
        assert_eq!(advise(999).category, "Hazardous");
    }

    #[test]
    fn test_step_function_is_monotonic() {
        let order = [
            AqiCategory::Good,
            AqiCategory::Moderate,
            AqiCategory::UnhealthyForSensitiveGroups,
            AqiCategory::Unhealthy,
            AqiCategory::VeryUnhealthy,
            AqiCategory::Hazardous,
        ];
        let rank = |c: AqiCategory| order.iter().position(|o| *o == c).unwrap();

        for aqi in 0..600 {
            assert!(rank(AqiCategory::from_aqi(aqi)) <= rank(AqiCategory::from_aqi(aqi + 1)));
        }
    }

    #[test]
    fn test_each_category_has_distinct_advice() {
        let mut messages: Vec<&str> = [25, 75, 125, 175, 250, 400]
            .iter()
            .map(|&aqi| advise(aqi).message)
            .collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), 6);
    }

    #[test]
    fn test_normalize_aqi() {
        assert_eq!(normalize_aqi(172.0), Some(172));
        assert_eq!(normalize_aqi(50.4), Some(50));
        assert_eq!(normalize_aqi(50.5), Some(51));
        assert_eq!(normalize_aqi(-3.0), None);
        assert_eq!(normalize_aqi(f64::NAN), None);
    }
}
