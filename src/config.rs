use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::notifications::SeenDecrementPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_FRAPPE_URL: &str = "http://localhost:8000";
const DEFAULT_SESSION_ID: &str = "default";
const DEFAULT_CACHE_DIR: &str = ".nirmaan-cache";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const CONFIG_DIR: &str = "config";

/// Acceptance-level time budgets for backend operations observed by the flows.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FlowTimeouts {
    /// A newly created/cancelled document must be discoverable in a list within this budget
    #[serde(default = "default_list_lookup_ms")]
    #[validate(range(min = 1))]
    pub list_lookup_ms: u64,

    /// A single mutation call must complete within this budget
    #[serde(default = "default_mutation_ms")]
    #[validate(range(min = 1))]
    pub mutation_ms: u64,

    /// Delay between list polls while waiting for discoverability
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
}

impl Default for FlowTimeouts {
    fn default() -> Self {
        Self {
            list_lookup_ms: default_list_lookup_ms(),
            mutation_ms: default_mutation_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl FlowTimeouts {
    pub fn list_lookup(&self) -> Duration {
        Duration::from_millis(self.list_lookup_ms)
    }

    pub fn mutation(&self) -> Duration {
        Duration::from_millis(self.mutation_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the Frappe site
    #[validate(custom = "validate_frappe_url")]
    pub frappe_url: String,

    /// API key half of the `token key:secret` credential
    #[serde(default)]
    pub api_key: Option<String>,

    /// API secret half of the `token key:secret` credential
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Session identifier used to namespace locally cached state
    #[serde(default = "default_session_id")]
    #[validate(length(min = 1))]
    pub session_id: String,

    /// Directory for the durable local cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Capacity of the push-event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How `mark_seen_notification` adjusts the unseen counter
    #[serde(default)]
    pub seen_decrement: SeenDecrementPolicy,

    #[serde(default)]
    #[validate]
    pub timeouts: FlowTimeouts,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frappe_url: DEFAULT_FRAPPE_URL.to_string(),
            api_key: None,
            api_secret: None,
            session_id: default_session_id(),
            cache_dir: default_cache_dir(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            seen_decrement: SeenDecrementPolicy::default(),
            timeouts: FlowTimeouts::default(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// `token key:secret` header value when both halves are configured.
    pub fn authorization(&self) -> Option<String> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some(format!("token {}:{}", key, secret)),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_list_lookup_ms() -> u64 {
    25_000
}

fn default_mutation_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn validate_frappe_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("frappe_url");
            err.message = Some("frappe_url must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("nirmaan={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (NIRMAAN__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("frappe_url", DEFAULT_FRAPPE_URL)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("NIRMAAN").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
