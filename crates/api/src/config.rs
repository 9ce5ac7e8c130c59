//! Application configuration loaded from environment variables.

use std::str::FromStr;

use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown STORAGE_BACKEND '{0}', expected 'memory' or 'postgres'")]
    UnknownBackend(String),

    #[error("DATABASE_URL is required when STORAGE_BACKEND is 'postgres'")]
    MissingDatabaseUrl,
}

/// Where booking records and recovery tokens are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres => "postgres",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `STORAGE_BACKEND`: `memory` or `postgres`, with `DATABASE_URL`
/// - `PAYMENT_WEBHOOK_SECRETS`, `SCHEDULING_WEBHOOK_SECRETS`: comma-separated
///   signing keys, primary first
/// - `WEBHOOK_TOLERANCE_SECS`, `RECOVERY_TOKEN_TTL_MINUTES`,
///   `MAX_TRANSITION_RETRIES`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub payment_webhook_secrets: Vec<String>,
    pub scheduling_webhook_secrets: Vec<String>,
    pub webhook_tolerance_secs: i64,
    pub recovery_token_ttl_minutes: i64,
    pub max_transition_retries: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// The storage backend is never guessed: an unknown value, or `postgres`
    /// without a database URL, is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }
        let parsed_lookup = &lookup;

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => defaults.storage_backend,
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(parsed_lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            storage_backend,
            database_url,
            payment_webhook_secrets: lookup("PAYMENT_WEBHOOK_SECRETS")
                .map(|v| split_keys(&v))
                .unwrap_or_default(),
            scheduling_webhook_secrets: lookup("SCHEDULING_WEBHOOK_SECRETS")
                .map(|v| split_keys(&v))
                .unwrap_or_default(),
            webhook_tolerance_secs: parse_var(parsed_lookup, "WEBHOOK_TOLERANCE_SECS")
                .unwrap_or(defaults.webhook_tolerance_secs),
            recovery_token_ttl_minutes: parse_var(parsed_lookup, "RECOVERY_TOKEN_TTL_MINUTES")
                .unwrap_or(defaults.recovery_token_ttl_minutes),
            max_transition_retries: parse_var(parsed_lookup, "MAX_TRANSITION_RETRIES")
                .unwrap_or(defaults.max_transition_retries),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            storage_backend: StorageBackend::Memory,
            database_url: None,
            payment_webhook_secrets: Vec::new(),
            scheduling_webhook_secrets: Vec::new(),
            webhook_tolerance_secs: 300,
            recovery_token_ttl_minutes: 15,
            max_transition_retries: 5,
        }
    }
}

/// Splits a comma-separated key list, keeping order and dropping blanks.
fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}
