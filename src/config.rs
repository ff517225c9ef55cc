use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

use crate::models::OrderNumbering;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_ORDER_PREFIX: &str = "BS";
const DEFAULT_ORDER_START_SEQUENCE: u32 = 1;
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

/// Credentials and endpoint for the redirect-based wallet provider.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct WalletProviderConfig {
    pub base_url: String,
    #[validate(length(min = 1))]
    pub client_id: String,
    #[validate(length(min = 1))]
    pub client_secret: String,
}

/// Credentials and endpoint for the card-processing provider.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CardProviderConfig {
    pub base_url: String,
    #[validate(length(min = 1))]
    pub client_id: String,
    #[validate(length(min = 1))]
    pub client_secret: String,
}

/// Mail-relay endpoint for buyer/merchant order notifications.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct MailRelayConfig {
    pub endpoint: String,
    #[validate(email)]
    pub merchant_email: String,
    #[validate(email)]
    pub sender_email: String,
}

/// Application configuration.
///
/// The storage backend is selected once at startup: a configured
/// `database_url` picks the database backend, otherwise records live in
/// JSON files under `data_dir`.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL; absence selects the file backend.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Root directory for the file backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Server host address.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging).
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup (database backend).
    #[serde(default)]
    pub auto_migrate: bool,

    /// Prefix for human-readable order numbers.
    #[serde(default = "default_order_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub order_number_prefix: String,

    /// First sequence handed out in a year with no orders yet.
    #[serde(default = "default_order_start_sequence")]
    pub order_start_sequence: u32,

    /// Shop currency (single-currency deployment).
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Shared secret for the admin surface. Absent means the admin
    /// routes reject every request.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Outbound provider call timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub wallet: Option<WalletProviderConfig>,

    #[serde(default)]
    #[validate]
    pub card: Option<CardProviderConfig>,

    #[serde(default)]
    #[validate]
    pub mail: Option<MailRelayConfig>,

    /// CORS: comma-separated allowed origins (production).
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_order_prefix() -> String {
    DEFAULT_ORDER_PREFIX.to_string()
}

fn default_order_start_sequence() -> u32 {
    DEFAULT_ORDER_START_SEQUENCE
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn numbering(&self) -> OrderNumbering {
        OrderNumbering {
            prefix: self.order_number_prefix.clone(),
            start_sequence: self.order_start_sequence,
        }
    }

    pub fn uses_database_backend(&self) -> bool {
        self.database_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            order_number_prefix: default_order_prefix(),
            order_start_sequence: default_order_start_sequence(),
            currency: default_currency(),
            admin_token: None,
            provider_timeout_secs: default_provider_timeout_secs(),
            wallet: None,
            card: None,
            mail: None,
            cors_allowed_origins: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    info!(
        backend = if app_config.uses_database_backend() { "database" } else { "file" },
        "Configuration loaded successfully"
    );
    Ok(app_config)
}

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
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
