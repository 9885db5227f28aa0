use crate::engine::{EngineSettings, EventThresholds};
use crate::finder::{FilterConfig, parse_route_whitelist};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_FEED_URL: &str = "https://ckan2.multimediagdansk.pl/gpsPositions?v=2";
pub const DEFAULT_FEED_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RADIUS_METERS: u32 = 50;
pub const DEFAULT_SHOTS_IN: u32 = 2;
pub const DEFAULT_SHOTS_OUT: u32 = 3;
pub const DEFAULT_TICK_INTERVAL_MINUTES: u64 = 3;
pub const MAX_TICK_INTERVAL_MINUTES: u64 = 24 * 60;
pub const DEFAULT_GPS_STALENESS_TOLERANCE_SECS: u64 = 120;
pub const DEFAULT_ROUTE_WHITELIST: &str = "2,5,12,169,171,179,6,8,11";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub feed: Option<FeedSection>,
    pub tracking: TrackingSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSection {
    /// Vehicle positions endpoint
    pub url: Option<String>,
    /// Whole-request timeout in seconds (default: 30)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingSection {
    /// Tracker ids whose locations are pushed to the service
    pub trackers: Vec<String>,
    /// Optional display names keyed by tracker id
    #[serde(default)]
    pub names: HashMap<String, String>,
    pub radius_meters: Option<u32>,
    pub shots_in: Option<u32>,
    pub shots_out: Option<u32>,
    pub tick_interval_minutes: Option<u64>,
    pub gps_staleness_tolerance_secs: Option<u64>,
    /// Comma-separated route ids; empty accepts every route
    pub route_whitelist: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse(&contents)
}

/// Parse and validate a TOML document.
pub fn parse(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let tracking = &self.tracking;
        if tracking.trackers.is_empty() {
            return Err(ConfigError::Invalid(
                "tracking.trackers must name at least one tracker".to_string(),
            ));
        }
        for (key, value) in [
            ("radius_meters", tracking.radius_meters.map(u64::from)),
            ("shots_in", tracking.shots_in.map(u64::from)),
            ("shots_out", tracking.shots_out.map(u64::from)),
            ("tick_interval_minutes", tracking.tick_interval_minutes),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "tracking.{key} must be at least 1"
                )));
            }
        }
        if tracking
            .tick_interval_minutes
            .is_some_and(|minutes| minutes > MAX_TICK_INTERVAL_MINUTES)
        {
            return Err(ConfigError::Invalid(format!(
                "tracking.tick_interval_minutes must be at most {MAX_TICK_INTERVAL_MINUTES}"
            )));
        }
        if self.feed_timeout().is_zero() {
            return Err(ConfigError::Invalid(
                "feed.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn feed_url(&self) -> &str {
        self.feed
            .as_ref()
            .and_then(|f| f.url.as_deref())
            .unwrap_or(DEFAULT_FEED_URL)
    }

    pub fn feed_timeout(&self) -> Duration {
        let secs = self
            .feed
            .as_ref()
            .and_then(|f| f.timeout_secs)
            .unwrap_or(DEFAULT_FEED_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn trackers(&self) -> &[String] {
        &self.tracking.trackers
    }

    pub fn radius_meters(&self) -> u32 {
        self.tracking.radius_meters.unwrap_or(DEFAULT_RADIUS_METERS)
    }

    pub fn thresholds(&self) -> EventThresholds {
        EventThresholds {
            shots_in: self.tracking.shots_in.unwrap_or(DEFAULT_SHOTS_IN),
            shots_out: self.tracking.shots_out.unwrap_or(DEFAULT_SHOTS_OUT),
        }
    }

    /// Returns the tick interval as Duration (default: 3 minutes)
    pub fn tick_interval(&self) -> Duration {
        let minutes = self
            .tracking
            .tick_interval_minutes
            .unwrap_or(DEFAULT_TICK_INTERVAL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn gps_staleness_tolerance(&self) -> Duration {
        Duration::from_secs(
            self.tracking
                .gps_staleness_tolerance_secs
                .unwrap_or(DEFAULT_GPS_STALENESS_TOLERANCE_SECS),
        )
    }

    pub fn route_whitelist(&self) -> &str {
        self.tracking
            .route_whitelist
            .as_deref()
            .unwrap_or(DEFAULT_ROUTE_WHITELIST)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            trackers: self.tracking.trackers.clone(),
            tracker_names: self.tracking.names.clone(),
            radius_meters: f64::from(self.radius_meters()),
            thresholds: self.thresholds(),
            filter: FilterConfig::new(
                parse_route_whitelist(self.route_whitelist()),
                self.gps_staleness_tolerance(),
            ),
        }
    }

    /// Max log level, falling back to INFO for unknown values.
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const MINIMAL: &str = r#"
[app]
name = "transit-presence"

[logging]
level = "debug"

[tracking]
trackers = ["device_tracker.phone"]
"#;

    #[test]
    fn default_config_is_valid() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert!(!config.trackers().is_empty());
        Ok(())
    }

    #[test]
    fn missing_options_fall_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = parse(MINIMAL)?;

        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.feed_url(), DEFAULT_FEED_URL);
        assert_eq!(config.feed_timeout(), Duration::from_secs(30));
        assert_eq!(config.radius_meters(), 50);
        assert_eq!(
            config.thresholds(),
            EventThresholds {
                shots_in: 2,
                shots_out: 3
            }
        );
        assert_eq!(config.tick_interval(), Duration::from_secs(180));
        assert_eq!(config.gps_staleness_tolerance(), Duration::from_secs(120));
        assert_eq!(config.log_level(), tracing::Level::DEBUG);

        let settings = config.engine_settings();
        assert_eq!(settings.filter.route_whitelist.len(), 9);
        assert!(settings.filter.route_whitelist.contains("169"));
        assert!(settings.tracker_names.is_empty());
        Ok(())
    }

    #[test]
    fn empty_whitelist_accepts_all_routes() -> Result<(), Box<dyn std::error::Error>> {
        let config = parse(&format!("{MINIMAL}route_whitelist = \"\"\n"))?;

        assert!(config.engine_settings().filter.route_whitelist.is_empty());
        Ok(())
    }

    #[test]
    fn tracker_names_are_loaded() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{MINIMAL}radius_meters = 75\n\n[tracking.names]\n\"device_tracker.phone\" = \"Alex\"\n"
        );
        let config = parse(&contents)?;

        let settings = config.engine_settings();
        assert_eq!(settings.radius_meters, 75.0);
        assert_eq!(
            settings.tracker_names.get("device_tracker.phone").map(String::as_str),
            Some("Alex")
        );
        Ok(())
    }

    #[test]
    fn zero_shots_out_is_invalid() {
        let result = parse(&format!("{MINIMAL}shots_out = 0\n"));
        assert!(matches!(result, Err(ConfigError::Invalid(message)) if message.contains("shots_out")));
    }

    #[test]
    fn zero_radius_is_invalid() {
        let result = parse(&format!("{MINIMAL}radius_meters = 0\n"));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn tick_interval_above_one_day_is_invalid() {
        let result = parse(&format!(
            "{MINIMAL}tick_interval_minutes = 9223372036854775807\n"
        ));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid(message)) if message.contains("tick_interval_minutes")
        ));
    }

    #[test]
    fn tick_interval_of_one_day_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
        let config = parse(&format!("{MINIMAL}tick_interval_minutes = 1440\n"))?;
        assert_eq!(config.tick_interval(), Duration::from_secs(86_400));
        Ok(())
    }

    #[test]
    fn zero_staleness_is_allowed() -> Result<(), Box<dyn std::error::Error>> {
        let config = parse(&format!("{MINIMAL}gps_staleness_tolerance_secs = 0\n"))?;
        assert_eq!(config.gps_staleness_tolerance(), Duration::ZERO);
        Ok(())
    }

    #[test]
    fn empty_tracker_list_is_invalid() {
        let contents = r#"
[app]
name = "transit-presence"

[logging]
level = "info"

[tracking]
trackers = []
"#;
        let result = parse(contents);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let temp_dir = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = temp_dir.join(format!("transit-presence-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = std::env::temp_dir();
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = temp_dir.join(format!("transit-presence-invalid-{unique}.toml"));
        fs::write(&path, "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
