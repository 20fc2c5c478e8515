use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_MATCH_ACCEPT_INTERACTIVE: f64 = 0.6;
const DEFAULT_MATCH_ACCEPT_BULK: f64 = 0.8;
const DEFAULT_MAX_REPAIR_ATTEMPTS: i32 = 3;
const DEFAULT_MISSING_MAPPING_WARNING_THRESHOLD: u64 = 5;
const DEFAULT_FAILED_DEDUCTION_CRITICAL_THRESHOLD: u64 = 3;
const DEFAULT_DEDUCTION_TIMEOUT_SECS: u64 = 30;

/// Policy applied when a deduction finds less stock on hand than required
/// at the moment of the write (a concurrent sale got there first).
///
/// `Clamp` floors the quantity at zero and records the actually-applied
/// delta in the ledger, keeping the checkout path available at the cost of
/// ledger exactness. `Reject` fails the ingredient instead.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShortfallPolicy {
    #[default]
    Clamp,
    Reject,
}

/// Tunable thresholds for matching, repair, and health classification.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Acceptance threshold for interactive match suggestions
    #[serde(default = "default_match_accept_interactive")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub match_accept_interactive: f64,

    /// Acceptance threshold for automated bulk repair matching
    #[serde(default = "default_match_accept_bulk")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub match_accept_bulk: f64,

    /// Bounded retry budget for repair jobs
    #[serde(default = "default_max_repair_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub max_repair_attempts: i32,

    /// Shortfall handling at the moment of the stock write
    #[serde(default)]
    pub shortfall_policy: ShortfallPolicy,

    /// Missing mappings above this count classify a store as warning
    #[serde(default = "default_missing_mapping_warning_threshold")]
    pub missing_mapping_warning_threshold: u64,

    /// Failed deductions today above this count classify a store as critical
    #[serde(default = "default_failed_deduction_critical_threshold")]
    pub failed_deduction_critical_threshold: u64,

    /// Per-request deduction timeout in seconds
    #[serde(default = "default_deduction_timeout_secs")]
    pub deduction_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_accept_interactive: DEFAULT_MATCH_ACCEPT_INTERACTIVE,
            match_accept_bulk: DEFAULT_MATCH_ACCEPT_BULK,
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            shortfall_policy: ShortfallPolicy::default(),
            missing_mapping_warning_threshold: DEFAULT_MISSING_MAPPING_WARNING_THRESHOLD,
            failed_deduction_critical_threshold: DEFAULT_FAILED_DEDUCTION_CRITICAL_THRESHOLD,
            deduction_timeout_secs: DEFAULT_DEDUCTION_TIMEOUT_SECS,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Engine thresholds
    #[serde(default)]
    #[validate]
    pub engine: EngineConfig,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_match_accept_interactive() -> f64 {
    DEFAULT_MATCH_ACCEPT_INTERACTIVE
}
fn default_match_accept_bulk() -> f64 {
    DEFAULT_MATCH_ACCEPT_BULK
}
fn default_max_repair_attempts() -> i32 {
    DEFAULT_MAX_REPAIR_ATTEMPTS
}
fn default_missing_mapping_warning_threshold() -> u64 {
    DEFAULT_MISSING_MAPPING_WARNING_THRESHOLD
}
fn default_failed_deduction_critical_threshold() -> u64 {
    DEFAULT_FAILED_DEDUCTION_CRITICAL_THRESHOLD
}
fn default_deduction_timeout_secs() -> u64 {
    DEFAULT_DEDUCTION_TIMEOUT_SECS
}

impl AppConfig {
    /// Builds a config programmatically, mainly for tests and embedding.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading error: {0}")]
    LoadError(#[from] ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("larder_engine={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP_*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    let mut builder = Config::builder();

    if Path::new(CONFIG_DIR).exists() {
        builder = builder
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));
    } else {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let settings = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::new("sqlite::memory:", "test");
        assert!(cfg.engine.match_accept_bulk > cfg.engine.match_accept_interactive);
        assert_eq!(cfg.engine.shortfall_policy, ShortfallPolicy::Clamp);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn threshold_validation_rejects_out_of_range() {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.engine.match_accept_bulk = 1.5;
        assert!(cfg.validate().is_err());
    }
}
