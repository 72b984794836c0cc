use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationSource {
    Static,
    Remote,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub epa_api_base: String,
    pub epa_api_key: Option<String>,
    pub botsailor_api_base: String,
    pub botsailor_api_key: Option<String>,
    pub botsailor_bot_id: String,
    pub webhook_api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub upstream_timeout_secs: u64,
    pub subscriber_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_match_radius_km: Option<f64>,
    pub station_source: StationSource,
    pub use_mock_upstream: bool,
    pub app_timezone: String,
    pub app_env: String,
    pub support_helpline: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            epa_api_base: "https://api.epd-aqms-pk.com".to_string(),
            epa_api_key: None,
            botsailor_api_base: "https://app.botsailor.com".to_string(),
            botsailor_api_key: None,
            botsailor_bot_id: "232253".to_string(),
            webhook_api_key: None,
            cache_ttl_secs: 300,
            refresh_interval_secs: 300,
            upstream_timeout_secs: 10,
            subscriber_ttl_secs: 30 * 60,
            cleanup_interval_secs: 300,
            max_match_radius_km: None,
            station_source: StationSource::Static,
            use_mock_upstream: false,
            app_timezone: "Asia/Karachi".to_string(),
            app_env: "development".to_string(),
            support_helpline: "1373".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let station_source = match env::var("STATION_SOURCE")
            .unwrap_or_else(|_| "static".to_string())
            .to_lowercase()
            .as_str()
        {
            "static" => StationSource::Static,
            "remote" => StationSource::Remote,
            other => anyhow::bail!("STATION_SOURCE must be 'static' or 'remote', got '{}'", other),
        };

        let max_match_radius_km = optional_var::<f64>("MAX_MATCH_RADIUS_KM")?;
        if let Some(radius) = max_match_radius_km {
            if !radius.is_finite() || radius <= 0.0 {
                anyhow::bail!("MAX_MATCH_RADIUS_KM must be a positive number");
            }
        }

        let app_timezone = env::var("APP_TIMEZONE").unwrap_or(defaults.app_timezone);
        app_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("Invalid timezone: {}", app_timezone))?;

        Ok(Config {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: optional_var("PORT")?.unwrap_or(defaults.port),
            epa_api_base: env::var("EPA_API_BASE")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.epa_api_base),
            epa_api_key: non_empty_var("EPA_API_KEY"),
            botsailor_api_base: env::var("BOTSAILOR_API_BASE")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.botsailor_api_base),
            botsailor_api_key: non_empty_var("BOTSAILOR_API_KEY"),
            botsailor_bot_id: env::var("BOTSAILOR_BOT_ID").unwrap_or(defaults.botsailor_bot_id),
            webhook_api_key: non_empty_var("WEBHOOK_API_KEY"),
            cache_ttl_secs: optional_var("CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl_secs),
            refresh_interval_secs: optional_var("REFRESH_INTERVAL_SECS")?
                .unwrap_or(defaults.refresh_interval_secs),
            upstream_timeout_secs: optional_var("UPSTREAM_TIMEOUT_SECS")?
                .unwrap_or(defaults.upstream_timeout_secs),
            subscriber_ttl_secs: optional_var("SUBSCRIBER_TTL_SECS")?
                .unwrap_or(defaults.subscriber_ttl_secs),
            cleanup_interval_secs: optional_var("CLEANUP_INTERVAL_SECS")?
                .unwrap_or(defaults.cleanup_interval_secs),
            max_match_radius_km,
            station_source,
            use_mock_upstream: optional_var("USE_MOCK_UPSTREAM")?.unwrap_or(false),
            app_timezone,
            app_env: env::var("APP_ENV").unwrap_or(defaults.app_env),
            support_helpline: env::var("SUPPORT_HELPLINE").unwrap_or(defaults.support_helpline),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.app_timezone.parse().unwrap_or(chrono_tz::Asia::Karachi)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn optional_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}
