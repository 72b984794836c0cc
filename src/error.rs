use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::response::{no_location_message, no_nearby_station_message};
use crate::stations::NearestStation;

/// Every failure a handler can report. Expected, user-actionable outcomes render as HTTP 200
/// with `success: false` so chat integrations can show the message as-is.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No location found")]
    NoLocationFound,
    #[error("No station within {max_radius_km} km")]
    NoNearbyStation {
        candidates: Vec<NearestStation>,
        max_radius_km: f64,
    },
    /// `degraded` is true when the service still holds some data, false when it has none.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String, degraded: bool },
    #[error("Not found: {message}")]
    NotFound { message: String, hint: Option<String> },
    #[error("Missing or invalid API key")]
    Unauthorized,
    #[error("Unexpected error: {source}")]
    Unexpected {
        source: anyhow::Error,
        expose_details: bool,
    },
}

impl AppError {
    pub fn unexpected(source: impl Into<anyhow::Error>, expose_details: bool) -> Self {
        Self::Unexpected {
            source: source.into(),
            expose_details,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NoLocationFound => "no_location_found",
            Self::NoNearbyStation { .. } => "no_nearby_station",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Unexpected { .. } => "unexpected_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NoLocationFound | Self::NoNearbyStation { .. } => StatusCode::OK,
            Self::UpstreamUnavailable { degraded: true, .. } => StatusCode::OK,
            Self::UpstreamUnavailable { degraded: false, .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CandidateSummary {
    pub station_name: String,
    pub city: Option<String>,
    pub distance_km: f64,
}

#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_stations: Option<Vec<CandidateSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FailureResponse {
    fn new(error: &'static str, message: String) -> Self {
        Self {
            success: false,
            error,
            message,
            nearest_stations: None,
            hint: None,
            incident_id: None,
            details: None,
            timestamp: Utc::now(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match self {
            Self::InvalidInput(message) => FailureResponse::new(code, message),
            Self::NoLocationFound => FailureResponse::new(code, no_location_message()),
            Self::NoNearbyStation {
                candidates,
                max_radius_km,
            } => {
                let mut body =
                    FailureResponse::new(code, no_nearby_station_message(&candidates, max_radius_km));
                body.nearest_stations = Some(
                    candidates
                        .into_iter()
                        .map(|c| CandidateSummary {
                            station_name: c.station.name,
                            city: c.station.city,
                            distance_km: crate::geo::round_to_decimals(c.distance_km, 2),
                        })
                        .collect(),
                );
                body
            }
            Self::UpstreamUnavailable { message, .. } => FailureResponse::new(code, message),
            Self::NotFound { message, hint } => {
                let mut body = FailureResponse::new(code, message);
                body.hint = hint;
                body
            }
            Self::Unauthorized => {
                FailureResponse::new(code, "Missing or invalid API key".to_string())
            }
            Self::Unexpected {
                source,
                expose_details,
            } => {
                let incident_id = Uuid::new_v4();
                tracing::error!("Unexpected error (incident {}): {:#}", incident_id, source);
                let mut body = FailureResponse::new(
                    code,
                    "Something went wrong while processing your request.".to_string(),
                );
                body.incident_id = Some(incident_id);
                if expose_details {
                    body.details = Some(format!("{:#}", source));
                }
                body
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NoLocationFound.status(), StatusCode::OK);
        assert_eq!(
            AppError::NoNearbyStation {
                candidates: vec![],
                max_radius_km: 20.0
            }
            .status(),
            StatusCode::OK
        );
        assert_eq!(
            AppError::UpstreamUnavailable {
                message: "x".into(),
                degraded: true
            }
            .status(),
            StatusCode::OK
        );
        assert_eq!(
            AppError::UpstreamUnavailable {
                message: "x".into(),
                degraded: false
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::unexpected(anyhow::anyhow!("boom"), false).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_unexpected_hides_details_in_production() {
        let response = AppError::unexpected(anyhow::anyhow!("database exploded"), false).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unexpected_error");
        assert!(body.get("details").is_none());
        assert!(body.get("incident_id").is_some());
        assert!(!bytes.windows(8).any(|w| w == b"exploded"));
    }

    #[tokio::test]
    async fn test_unexpected_shows_details_outside_production() {
        let response = AppError::unexpected(anyhow::anyhow!("database exploded"), true).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["details"], "database exploded");
    }
}
