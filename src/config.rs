//! Configuration management for the `badevand` core
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::BadevandError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadevandConfig {
    /// Upstream data source settings
    #[serde(default)]
    pub source: SourceConfig,
    /// Acquisition pipeline timing
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Marker clustering settings
    #[serde(default)]
    pub clustering: ClusteringConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream data source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Canonical JSON endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Website root loaded by the embedded browser
    #[serde(default = "default_website_url")]
    pub website_url: String,
    /// Substring identifying the data endpoint inside the page
    #[serde(default = "default_endpoint_pattern")]
    pub endpoint_pattern: String,
    /// User agent presented by the direct fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Transport timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u32,
}

/// Timing of the scrape fallback and its retry pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Time without payload before user verification is requested
    #[serde(default = "default_verification_timeout")]
    pub verification_timeout_ms: u64,
    /// Period of the rendered-body poll
    #[serde(default = "default_body_poll")]
    pub body_poll_ms: u64,
    /// Period of the navigation-change poll
    #[serde(default = "default_navigation_poll")]
    pub navigation_poll_ms: u64,
    /// Delay between a detected navigation and the body re-check
    #[serde(default = "default_navigation_recheck")]
    pub navigation_recheck_ms: u64,
    /// Reload pacing after recoverable browser load errors
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Backoff policy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_backoff_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_attempts")]
    pub max_attempts: u32,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Dataset TTL in hours
    #[serde(default = "default_cache_ttl")]
    pub ttl_hours: u32,
    /// Directory of the persistent store
    #[serde(default = "default_cache_location")]
    pub location: String,
}

/// Marker clustering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Cluster radius in screen pixels, 0 disables clustering
    #[serde(default = "default_cluster_radius")]
    pub radius_pixels: u32,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    #[serde(default)]
    pub min_zoom: u8,
    #[serde(default = "default_min_points")]
    pub min_points: u32,
    /// Tile extent the radius is relative to
    #[serde(default = "default_extent")]
    pub extent: u32,
    #[serde(default = "default_node_size")]
    pub node_size: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_api_url() -> String {
    "https://badevand.dk/api/next/beaches".to_string()
}

fn default_website_url() -> String {
    "https://badevand.dk".to_string()
}

fn default_endpoint_pattern() -> String {
    "api/next/beaches".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15".to_string()
}

fn default_source_timeout() -> u32 {
    30
}

fn default_verification_timeout() -> u64 {
    8000
}

fn default_body_poll() -> u64 {
    2000
}

fn default_navigation_poll() -> u64 {
    500
}

fn default_navigation_recheck() -> u64 {
    500
}

fn default_backoff_initial() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max_delay() -> u64 {
    30_000
}

fn default_backoff_attempts() -> u32 {
    3
}

fn default_cache_ttl() -> u32 {
    6
}

fn default_cache_location() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("badevand").to_string_lossy().into_owned())
        .unwrap_or_else(|| ".badevand".to_string())
}

fn default_cluster_radius() -> u32 {
    32
}

fn default_max_zoom() -> u8 {
    16
}

fn default_min_points() -> u32 {
    2
}

fn default_extent() -> u32 {
    512
}

fn default_node_size() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            website_url: default_website_url(),
            endpoint_pattern: default_endpoint_pattern(),
            user_agent: default_user_agent(),
            timeout_seconds: default_source_timeout(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            verification_timeout_ms: default_verification_timeout(),
            body_poll_ms: default_body_poll(),
            navigation_poll_ms: default_navigation_poll(),
            navigation_recheck_ms: default_navigation_recheck(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_backoff_initial(),
            multiplier: default_backoff_multiplier(),
            max_delay_ms: default_backoff_max_delay(),
            max_attempts: default_backoff_attempts(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_cache_ttl(),
            location: default_cache_location(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius_pixels: default_cluster_radius(),
            max_zoom: default_max_zoom(),
            min_zoom: 0,
            min_points: default_min_points(),
            extent: default_extent(),
            node_size: default_node_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for BadevandConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            acquisition: AcquisitionConfig::default(),
            cache: CacheConfig::default(),
            clustering: ClusteringConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    #[must_use]
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    #[must_use]
    pub fn body_poll(&self) -> Duration {
        Duration::from_millis(self.body_poll_ms)
    }

    #[must_use]
    pub fn navigation_poll(&self) -> Duration {
        Duration::from_millis(self.navigation_poll_ms)
    }

    #[must_use]
    pub fn navigation_recheck(&self) -> Duration {
        Duration::from_millis(self.navigation_recheck_ms)
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_hours) * 60 * 60)
    }
}

impl BadevandConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // BADEVAND_CACHE__TTL_HOURS=12 overrides cache.ttl_hours
        builder = builder.add_source(
            Environment::with_prefix("BADEVAND")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: BadevandConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("badevand").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.source.api_url.is_empty() {
            self.source.api_url = default_api_url();
        }
        if self.source.website_url.is_empty() {
            self.source.website_url = default_website_url();
        }
        if self.source.endpoint_pattern.is_empty() {
            self.source.endpoint_pattern = default_endpoint_pattern();
        }
        if self.source.user_agent.is_empty() {
            self.source.user_agent = default_user_agent();
        }
        if self.source.timeout_seconds == 0 {
            self.source.timeout_seconds = default_source_timeout();
        }
        if self.acquisition.verification_timeout_ms == 0 {
            self.acquisition.verification_timeout_ms = default_verification_timeout();
        }
        if self.acquisition.body_poll_ms == 0 {
            self.acquisition.body_poll_ms = default_body_poll();
        }
        if self.acquisition.navigation_poll_ms == 0 {
            self.acquisition.navigation_poll_ms = default_navigation_poll();
        }
        if self.cache.ttl_hours == 0 {
            self.cache.ttl_hours = default_cache_ttl();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.clustering.max_zoom == 0 {
            self.clustering.max_zoom = default_max_zoom();
        }
        if self.clustering.extent == 0 {
            self.clustering.extent = default_extent();
        }
        if self.clustering.node_size == 0 {
            self.clustering.node_size = default_node_size();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.source.timeout_seconds > 300 {
            return Err(BadevandError::config("Source timeout cannot exceed 300 seconds").into());
        }

        if self.acquisition.verification_timeout_ms > 120_000 {
            return Err(BadevandError::config(
                "Verification timeout cannot exceed 120000 ms",
            )
            .into());
        }

        if self.acquisition.backoff.multiplier < 1.0 {
            return Err(BadevandError::config("Backoff multiplier must be at least 1.0").into());
        }

        if self.acquisition.backoff.max_attempts > 10 {
            return Err(BadevandError::config("Backoff max attempts cannot exceed 10").into());
        }

        if self.cache.ttl_hours > 168 {
            return Err(BadevandError::config("Cache TTL cannot exceed 168 hours (1 week)").into());
        }

        if self.clustering.max_zoom > 24 {
            return Err(BadevandError::config("Cluster max zoom cannot exceed 24").into());
        }

        if self.clustering.min_zoom > self.clustering.max_zoom {
            return Err(BadevandError::config("Cluster min zoom cannot exceed max zoom").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(BadevandError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(BadevandError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, value) in [
            ("Source API URL", &self.source.api_url),
            ("Source website URL", &self.source.website_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(
                    BadevandError::config(format!("{name} must be a valid HTTP or HTTPS URL"))
                        .into(),
                );
            }
        }

        Ok(())
    }
}
