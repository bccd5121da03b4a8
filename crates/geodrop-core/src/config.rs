//! Configuration management for the GeoDrop collectible map.
//!
//! This module provides the configuration system for the marker pipeline:
//! - Loading from YAML files
//! - Environment variable overrides
//! - Validation of all settings
//! - Map, marker, pin placement, clustering, location and logging sections

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```
/// use geodrop_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("markers:\n  debounce_ms: 250\n").unwrap();
/// assert_eq!(config.markers.debounce_ms, 250);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Map engine settings
    #[serde(default)]
    pub map: MapConfig,

    /// Marker lifecycle settings
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Draft pin settings
    #[serde(default)]
    pub pin: PinConfig,

    /// Clustering policy
    #[serde(default)]
    pub clustering: ClusterConfig,

    /// Location and nearby-fetch settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering `GEODROP__*`
    /// environment variables over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("GEODROP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// The map access token is not checked here: a missing token disables
    /// rendering only, see [`MapConfig::require_access_token`].
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<()> {
        self.markers.validate()?;
        self.pin.validate()?;
        self.clustering.validate()?;
        self.location.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// Map engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Access token for the map engine
    #[serde(default)]
    pub access_token: Option<String>,

    /// Map style reference
    #[serde(default = "default_style")]
    pub style: String,

    /// Zoom level used when the view opens
    #[serde(default = "default_initial_zoom")]
    pub initial_zoom: f64,

    /// Camera animation duration for fly-to/ease-to commands
    #[serde(default = "default_camera_duration_ms")]
    pub camera_duration_ms: u64,
}

fn default_style() -> String {
    "standard".to_string()
}

fn default_initial_zoom() -> f64 {
    15.0
}

fn default_camera_duration_ms() -> u64 {
    1200
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            style: default_style(),
            initial_zoom: default_initial_zoom(),
            camera_duration_ms: default_camera_duration_ms(),
        }
    }
}

impl MapConfig {
    /// Returns the access token, failing if it is absent or blank.
    pub fn require_access_token(&self) -> Result<&str> {
        match self.access_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ConfigError::MissingAccessToken.into()),
        }
    }

    /// Returns the camera animation duration.
    pub fn camera_duration(&self) -> Duration {
        Duration::from_millis(self.camera_duration_ms)
    }
}

/// Marker lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Minimum spacing between two effective bulk refreshes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Markers updated more recently than this survive forced refreshes
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Retry policy while the rendering surface is not ready
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_grace_ms() -> u64 {
    5000
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            grace_ms: default_grace_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl MarkerConfig {
    /// Returns the debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the grace window.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Validates the marker configuration.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()
    }
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Multiplier applied per attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Number of retries before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    3200
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    6
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// Calculates the delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let backoff_ms =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_ms = backoff_ms.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Validates the retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "markers.retry.max_attempts",
                "must be at least 1",
            )
            .into());
        }
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(ConfigError::invalid_value(
                "markers.retry.backoff_multiplier",
                format!("must be >= 1.0, got {}", self.backoff_multiplier),
            )
            .into());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::invalid_value(
                "markers.retry.initial_backoff_ms",
                "cannot exceed max_backoff_ms",
            )
            .into());
        }
        Ok(())
    }
}

/// Draft pin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    /// Period of the position watchdog after a drag ends
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,

    /// How long the watchdog keeps re-asserting the committed position
    #[serde(default = "default_watchdog_window_ms")]
    pub watchdog_window_ms: u64,

    /// Positional drift (degrees) tolerated before a correction is issued
    #[serde(default = "default_drift_tolerance_deg")]
    pub drift_tolerance_deg: f64,

    /// Default geofence radius for newly authored collectibles
    #[serde(default = "default_pin_radius_m")]
    pub default_radius_m: u32,
}

fn default_watchdog_interval_ms() -> u64 {
    100
}

fn default_watchdog_window_ms() -> u64 {
    2000
}

fn default_drift_tolerance_deg() -> f64 {
    1e-9
}

fn default_pin_radius_m() -> u32 {
    50
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_ms: default_watchdog_interval_ms(),
            watchdog_window_ms: default_watchdog_window_ms(),
            drift_tolerance_deg: default_drift_tolerance_deg(),
            default_radius_m: default_pin_radius_m(),
        }
    }
}

impl PinConfig {
    /// Returns the watchdog period.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    /// Returns the watchdog window.
    pub fn watchdog_window(&self) -> Duration {
        Duration::from_millis(self.watchdog_window_ms)
    }

    /// Validates the pin configuration.
    pub fn validate(&self) -> Result<()> {
        if self.watchdog_interval_ms == 0 {
            return Err(
                ConfigError::invalid_value("pin.watchdog_interval_ms", "cannot be 0").into(),
            );
        }
        if self.drift_tolerance_deg < 0.0 {
            return Err(ConfigError::invalid_value(
                "pin.drift_tolerance_deg",
                "cannot be negative",
            )
            .into());
        }
        Ok(())
    }
}

/// Clustering policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Whether clustering is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Below this zoom level collectibles are aggregated
    #[serde(default = "default_zoom_threshold")]
    pub zoom_threshold: f64,

    /// Maximum centroid distance (degrees) for joining a cluster
    #[serde(default = "default_merge_tolerance_deg")]
    pub merge_tolerance_deg: f64,

    /// Added to the threshold when flying into a clicked cluster
    #[serde(default = "default_fly_to_zoom_step")]
    pub fly_to_zoom_step: f64,
}

fn default_zoom_threshold() -> f64 {
    10.0
}

fn default_merge_tolerance_deg() -> f64 {
    0.05
}

fn default_fly_to_zoom_step() -> f64 {
    2.0
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            zoom_threshold: default_zoom_threshold(),
            merge_tolerance_deg: default_merge_tolerance_deg(),
            fly_to_zoom_step: default_fly_to_zoom_step(),
        }
    }
}

impl ClusterConfig {
    /// Validates the clustering configuration.
    pub fn validate(&self) -> Result<()> {
        if self.merge_tolerance_deg <= 0.0 {
            return Err(ConfigError::invalid_value(
                "clustering.merge_tolerance_deg",
                "must be positive",
            )
            .into());
        }
        if self.fly_to_zoom_step <= 0.0 {
            return Err(ConfigError::invalid_value(
                "clustering.fly_to_zoom_step",
                "must be positive so a cluster click crosses the threshold",
            )
            .into());
        }
        Ok(())
    }
}

/// Location provider and nearby-fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Request a high-accuracy fix
    #[serde(default = "default_true")]
    pub high_accuracy: bool,

    /// Timeout for a single position request
    #[serde(default = "default_location_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum age of a cached fix the provider may return
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,

    /// Radius passed to the nearby query
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: u32,

    /// Minimum spacing between two nearby fetches
    #[serde(default = "default_fetch_cooldown_ms")]
    pub fetch_cooldown_ms: u64,

    /// Period of the continuous location watch
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
}

fn default_location_timeout_ms() -> u64 {
    10_000
}

fn default_max_age_ms() -> u64 {
    60_000
}

fn default_search_radius_m() -> u32 {
    5_000
}

fn default_fetch_cooldown_ms() -> u64 {
    3_000
}

fn default_watch_interval_ms() -> u64 {
    5_000
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: default_location_timeout_ms(),
            max_age_ms: default_max_age_ms(),
            search_radius_m: default_search_radius_m(),
            fetch_cooldown_ms: default_fetch_cooldown_ms(),
            watch_interval_ms: default_watch_interval_ms(),
        }
    }
}

impl LocationConfig {
    /// Returns the position request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the maximum accepted fix age.
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Returns the fetch cooldown.
    pub fn fetch_cooldown(&self) -> Duration {
        Duration::from_millis(self.fetch_cooldown_ms)
    }

    /// Returns the watch period.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Validates the location configuration.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "location.timeout_ms",
                "a request without timeout may never resolve",
            )
            .into());
        }
        if self.watch_interval_ms == 0 {
            return Err(
                ConfigError::invalid_value("location.watch_interval_ms", "cannot be 0").into(),
            );
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }

    /// Builds an env-filter directive string from the level and module overrides.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.clone()];
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();
        for (module, level) in modules {
            directives.push(format!("{}={}", module, level));
        }
        directives.join(",")
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
