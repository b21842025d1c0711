//! Configuration management for `TourWithMe`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::TravelError;
use crate::transport::RateTable;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// OpenRouteService geocoding/directions
    #[serde(default)]
    pub mapping: MappingConfig,
    /// Primary itinerary provider
    #[serde(default = "default_openrouter")]
    pub openrouter: LlmConfig,
    /// Fallback itinerary provider
    #[serde(default = "default_gemini")]
    pub gemini: LlmConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Per-mode transport rates used by the scorer
    #[serde(default)]
    pub transport: RateTable,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory with the built front-end bundle
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, `:memory:` for a throwaway database
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    /// Lifetime of geocoding results in hours
    #[serde(default = "default_geocode_ttl")]
    pub geocode_ttl_hours: u64,
    /// Lifetime of generated trip plans in minutes
    #[serde(default = "default_trip_plan_ttl")]
    pub trip_plan_ttl_minutes: u64,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP/HTTP collector endpoint, export disabled when unset
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_mapping_base_url")]
    pub base_url: String,
    #[serde(default = "default_mapping_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Settings shared by both language-model providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// Empty values are replaced with the provider default
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
}

/// Outgoing mail for trip invitations, disabled unless `relay` is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub relay: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> String {
    "frontend/dist".to_string()
}

fn default_request_timeout() -> u64 {
    90
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_database_path() -> String {
    "tourwithme.db".to_string()
}

fn default_cache_location() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("tourwithme").display().to_string())
        .unwrap_or_else(|| ".cache/tourwithme".to_string())
}

fn default_geocode_ttl() -> u64 {
    24 * 7
}

fn default_trip_plan_ttl() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_service_name() -> String {
    "tourwithme".to_string()
}

fn default_mapping_base_url() -> String {
    "https://api.openrouteservice.org".to_string()
}

fn default_mapping_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    2
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_llm_retries() -> u32 {
    1
}

fn default_session_ttl() -> u64 {
    24 * 7
}

fn default_openrouter() -> LlmConfig {
    LlmConfig {
        api_key: None,
        base_url: "https://openrouter.ai/api/v1".to_string(),
        model: "x-ai/grok-4.1-fast:free".to_string(),
        timeout_seconds: default_llm_timeout(),
        max_retries: default_llm_retries(),
    }
}

fn default_gemini() -> LlmConfig {
    LlmConfig {
        api_key: None,
        base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        model: "gemini-2.0-flash".to_string(),
        timeout_seconds: default_llm_timeout(),
        max_retries: default_llm_retries(),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
            mapping: MappingConfig::default(),
            openrouter: default_openrouter(),
            gemini: default_gemini(),
            auth: AuthConfig::default(),
            smtp: SmtpConfig::default(),
            transport: RateTable::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            request_timeout_seconds: default_request_timeout(),
            body_limit_bytes: default_body_limit(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_cache_location(),
            geocode_ttl_hours: default_geocode_ttl(),
            trip_plan_ttl_minutes: default_trip_plan_ttl(),
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

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_mapping_base_url(),
            timeout_seconds: default_mapping_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path()
                .filter(|path| path.exists())
                .unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // TOURWITHME_SERVER__PORT=9000 overrides server.port
        builder = builder.add_source(
            Environment::with_prefix("TOURWITHME")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_env_keys();
        config.apply_defaults();
        config.validate()?;

        tracing::debug!(path = %config_file.display(), "configuration loaded");
        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tourwithme").join("config.toml"))
    }

    /// Conventional provider variables fill keys the config left empty
    fn apply_env_keys(&mut self) {
        fill_from_env(&mut self.mapping.api_key, "OPENROUTE_API_KEY");
        fill_from_env(&mut self.openrouter.api_key, "OPENROUTER_API_KEY");
        fill_from_env(&mut self.gemini.api_key, "GEMINI_API_KEY");
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.server.host.is_empty() {
            self.server.host = default_host();
        }
        if self.server.port == 0 {
            self.server.port = default_port();
        }
        if self.server.static_dir.is_empty() {
            self.server.static_dir = default_static_dir();
        }
        if self.server.request_timeout_seconds == 0 {
            self.server.request_timeout_seconds = default_request_timeout();
        }
        if self.server.body_limit_bytes == 0 {
            self.server.body_limit_bytes = default_body_limit();
        }
        if self.database.path.is_empty() {
            self.database.path = default_database_path();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.geocode_ttl_hours == 0 {
            self.cache.geocode_ttl_hours = default_geocode_ttl();
        }
        if self.cache.trip_plan_ttl_minutes == 0 {
            self.cache.trip_plan_ttl_minutes = default_trip_plan_ttl();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.mapping.base_url.is_empty() {
            self.mapping.base_url = default_mapping_base_url();
        }
        if self.mapping.timeout_seconds == 0 {
            self.mapping.timeout_seconds = default_mapping_timeout();
        }
        for (llm, fallback) in [
            (&mut self.openrouter, default_openrouter()),
            (&mut self.gemini, default_gemini()),
        ] {
            if llm.base_url.is_empty() {
                llm.base_url = fallback.base_url;
            }
            if llm.model.is_empty() {
                llm.model = fallback.model;
            }
            if llm.timeout_seconds == 0 {
                llm.timeout_seconds = fallback.timeout_seconds;
            }
        }
        if self.auth.session_ttl_hours == 0 {
            self.auth.session_ttl_hours = default_session_ttl();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_api_keys()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        self.transport
            .validate()
            .map_err(|e| TravelError::config(e.user_message()))?;
        Ok(())
    }

    /// Validate API keys and credentials
    pub fn validate_api_keys(&self) -> Result<()> {
        for (name, key) in [
            ("Mapping", &self.mapping.api_key),
            ("OpenRouter", &self.openrouter.api_key),
            ("Gemini", &self.gemini.api_key),
        ] {
            // A missing key only disables the feature
            let Some(key) = key else { continue };

            if key.trim().is_empty() {
                return Err(TravelError::config(format!(
                    "{name} API key cannot be empty if provided. Either remove it or provide a valid key."
                ))
                .into());
            }

            if key.len() < 8 {
                return Err(TravelError::config(format!(
                    "{name} API key appears to be invalid (too short). Please check your API key."
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        for (name, timeout) in [
            ("Mapping", self.mapping.timeout_seconds),
            ("OpenRouter", self.openrouter.timeout_seconds),
            ("Gemini", self.gemini.timeout_seconds),
            ("Server request", self.server.request_timeout_seconds),
        ] {
            if timeout > 300 {
                return Err(TravelError::config(format!(
                    "{name} timeout cannot exceed 300 seconds"
                ))
                .into());
            }
        }

        if self.mapping.max_retries > 10
            || self.openrouter.max_retries > 10
            || self.gemini.max_retries > 10
        {
            return Err(TravelError::config("Max retries cannot exceed 10").into());
        }

        if self.cache.geocode_ttl_hours > 24 * 90 {
            return Err(TravelError::config("Geocode cache TTL cannot exceed 90 days").into());
        }

        if self.auth.session_ttl_hours > 24 * 365 {
            return Err(TravelError::config("Session lifetime cannot exceed one year").into());
        }

        if self.server.body_limit_bytes > 64 * 1024 * 1024 {
            return Err(TravelError::config("Request body limit cannot exceed 64 MiB").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(TravelError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(TravelError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("Mapping", &self.mapping.base_url),
            ("OpenRouter", &self.openrouter.base_url),
            ("Gemini", &self.gemini.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(TravelError::config(format!(
                    "{name} base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        if self.server.tls_cert_path.is_some() != self.server.tls_key_path.is_some() {
            return Err(TravelError::config(
                "TLS requires both tls_cert_path and tls_key_path",
            )
            .into());
        }

        if self.smtp.relay.is_some() && self.smtp.from.is_none() {
            return Err(TravelError::config("SMTP relay configured without a from address").into());
        }

        Ok(())
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.is_none() {
        *slot = std::env::var(var).ok().filter(|value| !value.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.mapping.base_url, "https://api.openrouteservice.org");
        assert_eq!(config.mapping.timeout_seconds, 15);
        assert_eq!(config.openrouter.model, "x-ai/grok-4.1-fast:free");
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.cache.trip_plan_ttl_minutes, 120);
        assert_eq!(config.logging.level, "info");
        assert!(config.mapping.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_api_key() {
        let mut config = AppConfig::default();
        config.mapping.api_key = Some("short".to_string());
        assert!(config.validate().is_err());

        config.mapping.api_key = Some("a-perfectly-long-key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = AppConfig::default();
        config.openrouter.timeout_seconds = 301;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gemini.max_retries = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_strings() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.mapping.base_url = "ftp://maps".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.tls_cert_path = Some("cert.pem".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_defaults_fills_zero_values() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        config.gemini.model = String::new();
        config.cache.trip_plan_ttl_minutes = 0;
        config.apply_defaults();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.cache.trip_plan_ttl_minutes, 120);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[logging]
format = "json"

[transport]
currency = "INR"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(Some(path)).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.transport.modes.len(), 4);
    }
}
