use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    aqi::{
        cache::CacheStatus,
        gateway::{AqiGateway, GatewayError},
        types::AqiReading,
    },
    botsailor::{extract_latest_location, BotSailorError, ConversationSource, LocationError},
    config::Config,
    error::AppError,
    response::{format_city_report, format_report, unavailable_message, AqiReport, CityReport},
    stations::{city_pattern, nearest_candidates, resolve_nearest, ResolveError, StationDirectory},
    subscribers::{StoredResult, SubscriberStore},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stations: Arc<StationDirectory>,
    pub gateway: Arc<AqiGateway>,
    pub subscribers: SubscriberStore,
    pub conversations: Arc<dyn ConversationSource>,
    pub timezone: Tz,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    fn resolve_error(&self, lat: f64, lon: f64, error: ResolveError) -> AppError {
        match error {
            ResolveError::InvalidCoordinates(message) => AppError::InvalidInput(message),
            ResolveError::NoNearbyStation { max_radius_km, .. } => AppError::NoNearbyStation {
                candidates: nearest_candidates(lat, lon, self.stations.stations(), 3),
                max_radius_km,
            },
            ResolveError::EmptyDirectory => {
                AppError::unexpected(ResolveError::EmptyDirectory, !self.config.is_production())
            }
        }
    }

    fn unavailable(&self, subject: &str, error: GatewayError) -> AppError {
        tracing::warn!("{}", error);
        let degraded = match error {
            GatewayError::DataUnavailable(_) => !self.gateway.fallback().is_empty(),
            GatewayError::NoData => false,
        };
        AppError::UpstreamUnavailable {
            message: unavailable_message(subject, &self.config.support_helpline),
            degraded,
        }
    }

    /// Nearest station plus its current reading, formatted for display.
    async fn report_for_location(&self, lat: f64, lon: f64) -> Result<AqiReport, AppError> {
        let nearest = resolve_nearest(lat, lon, self.stations.stations(), self.config.max_match_radius_km)
            .map_err(|e| self.resolve_error(lat, lon, e))?;

        tracing::info!(
            "Nearest station to ({}, {}) is {} at {:.2} km",
            lat,
            lon,
            nearest.station.name,
            nearest.distance_km
        );

        let reading = self
            .gateway
            .get_reading(&nearest.station.name)
            .await
            .map_err(|e| self.unavailable(&nearest.station.name, e))?;

        Ok(format_report(&nearest, &reading, self.timezone, Utc::now()))
    }
}

impl From<LocationError> for AppError {
    fn from(error: LocationError) -> Self {
        match error {
            LocationError::NoLocationFound => AppError::NoLocationFound,
        }
    }
}

impl From<BotSailorError> for AppError {
    fn from(error: BotSailorError) -> Self {
        tracing::error!("BotSailor request failed: {}", error);
        AppError::UpstreamUnavailable {
            message: "We couldn't load your recent messages right now. Please try again shortly."
                .to_string(),
            degraded: false,
        }
    }
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct NearestQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub lon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub subscriber_id: Option<Value>,
    pub phone_number: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_secs: i64,
    pub stations: usize,
    pub fallback_stations: usize,
    pub stored_results: u64,
    pub mock_upstream: bool,
    pub cache: CacheStatus,
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_coordinate(object: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| object.get(*key).and_then(coordinate))
}

fn pair_from_object(object: &Value) -> Option<(f64, f64)> {
    let lat = first_coordinate(object, &["latitude", "lat"])?;
    let lon = first_coordinate(object, &["longitude", "lon", "lng", "long"])?;
    Some((lat, lon))
}

/// Pull a coordinate pair out of a webhook body.
///
/// Accepts `latitude`/`longitude` (or `lat` with `lon`/`lng`) at the top level or under
/// `location`, and a `coordinates` field holding either `[lat, lon]` or an object. Numeric
/// strings are accepted.
pub fn extract_coordinates(body: &Value) -> Result<(f64, f64), AppError> {
    if let Some(pair) = pair_from_object(body) {
        return Ok(pair);
    }
    if let Some(pair) = body.get("location").and_then(pair_from_object) {
        return Ok(pair);
    }
    match body.get("coordinates") {
        Some(Value::Array(items)) if items.len() == 2 => {
            if let (Some(lat), Some(lon)) = (coordinate(&items[0]), coordinate(&items[1])) {
                return Ok((lat, lon));
            }
        }
        Some(object @ Value::Object(_)) => {
            if let Some(pair) = pair_from_object(object) {
                return Ok(pair);
            }
        }
        _ => {}
    }

    Err(AppError::InvalidInput(
        "Request must include numeric latitude and longitude".to_string(),
    ))
}

fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn describe_ttl(secs: u64) -> String {
    match secs {
        60 => "1 minute".to_string(),
        s if s >= 60 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s),
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::InvalidInput(format!("Invalid JSON body: {}", rejection.body_text())))
}

// Route handlers
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "aqi-webhook",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /health": "Service health and cache status",
            "POST /nearest-aqi": "AQI at the station nearest to { latitude, longitude }",
            "GET /nearest-aqi?lat=&lng=": "Same lookup via query parameters",
            "POST /botsailor-location": "Resolve a subscriber's latest shared location and store the result",
            "GET /get-aqi/:subscriber_id": "Last stored result for a subscriber",
            "GET /aqi-city/:city": "Average AQI across a city's stations",
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: now,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (now - state.started_at).num_seconds(),
        stations: state.stations.len(),
        fallback_stations: state.gateway.fallback().len(),
        stored_results: state.subscribers.len(),
        mock_upstream: state.config.use_mock_upstream,
        cache: state.gateway.cache().status().await,
    })
}

pub async fn nearest_aqi(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AqiReport>, AppError> {
    let body = json_body(body)?;
    let (lat, lon) = extract_coordinates(&body)?;
    Ok(Json(state.report_for_location(lat, lon).await?))
}

pub async fn nearest_aqi_query(
    State(state): State<AppState>,
    Query(params): Query<NearestQuery>,
) -> Result<Json<AqiReport>, AppError> {
    let parse = |value: Option<&String>| value.and_then(|v| v.trim().parse::<f64>().ok());
    let lat = parse(params.lat.as_ref());
    let lon = parse(params.lng.as_ref().or(params.lon.as_ref()));

    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(AppError::InvalidInput(
            "Query must include numeric lat and lng".to_string(),
        ));
    };
    Ok(Json(state.report_for_location(lat, lon).await?))
}

pub async fn botsailor_location(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AqiReport>, AppError> {
    let body = json_body(body)?;
    let request: LocationRequest = serde_json::from_value(body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid request: {}", e)))?;

    let subscriber_id = identifier(request.subscriber_id.as_ref());
    let phone_number = identifier(request.phone_number.as_ref());
    let (Some(subscriber_id), Some(_)) = (subscriber_id, phone_number) else {
        return Err(AppError::InvalidInput(
            "subscriber_id and phone_number are required".to_string(),
        ));
    };

    tracing::info!("Location request for subscriber {}", subscriber_id);

    let conversation = state.conversations.load_conversation(&subscriber_id).await?;
    let location = extract_latest_location(&conversation)?;
    tracing::debug!(
        "Latest shared location for {}: ({}, {})",
        subscriber_id,
        location.latitude,
        location.longitude
    );

    let report = state
        .report_for_location(location.latitude, location.longitude)
        .await?;
    state.subscribers.store(&subscriber_id, report.clone()).await;

    Ok(Json(report))
}

pub async fn get_stored_aqi(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
) -> Result<Json<StoredResult>, AppError> {
    state
        .subscribers
        .get(&subscriber_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            message: format!("No AQI result stored for subscriber {}", subscriber_id),
            hint: Some(format!(
                "Call POST /botsailor-location first. Data expires after {}.",
                describe_ttl(state.config.subscriber_ttl_secs)
            )),
        })
}

pub async fn city_aqi(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> Result<Json<CityReport>, AppError> {
    let Some(pattern) = city_pattern(&city) else {
        return Err(AppError::InvalidInput(format!("City not supported: {}", city)));
    };
    let city = city.trim();

    let set = state
        .gateway
        .get_all_readings()
        .await
        .map_err(|e| state.unavailable(city, e))?;

    let matching: Vec<&AqiReading> = set
        .readings
        .values()
        .filter(|reading| reading.station.contains(pattern))
        .collect();

    format_city_report(city, &matching, set.source)
        .map(Json)
        .ok_or_else(|| AppError::UpstreamUnavailable {
            message: unavailable_message(city, &state.config.support_helpline),
            degraded: true,
        })
}

/// Rejects requests without the configured `X-API-Key`. A no-op when no key is configured.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = &state.config.webhook_api_key {
        let provided = request
            .headers()
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!("Rejected request to {} with missing or invalid API key", request.uri().path());
            return Err(AppError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    let webhooks = Router::new()
        .route("/nearest-aqi", get(nearest_aqi_query).post(nearest_aqi))
        .route("/botsailor-location", post(botsailor_location))
        .route("/get-aqi/:subscriber_id", get(get_stored_aqi))
        .route("/aqi-city/:city", get(city_aqi))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(webhooks)
        .with_state(state)
}
