//! Application configuration loaded from environment variables.

use std::str::FromStr;

use common::UserId;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected pretty or json, got {other:?}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` — PostgreSQL URL; unset selects the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `5`)
/// - `AUTH_TOKENS` — `token=user-uuid` pairs separated by commas
/// - `STORE_READ_RETRIES` — retries for transient read failures (default: `2`)
/// - `CORS_ALLOW_ORIGIN` — allowed origin, `*` for any (default: `*`)
/// - `SEED_AREAS` — import the built-in administrative areas at start-up (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub auth_tokens: Vec<(String, UserId)>,
    pub store_read_retries: u32,
    pub cors_allow_origin: String,
    pub seed_areas: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: value("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", value("PORT"), defaults.port)?,
            log_level: value("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or("LOG_FORMAT", value("LOG_FORMAT"), defaults.log_format)?,
            database_url: value("DATABASE_URL"),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                value("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            )?,
            auth_tokens: match value("AUTH_TOKENS") {
                Some(raw) => parse_tokens(&raw)?,
                None => defaults.auth_tokens,
            },
            store_read_retries: parse_or(
                "STORE_READ_RETRIES",
                value("STORE_READ_RETRIES"),
                defaults.store_read_retries,
            )?,
            cors_allow_origin: value("CORS_ALLOW_ORIGIN").unwrap_or(defaults.cors_allow_origin),
            seed_areas: parse_or("SEED_AREAS", value("SEED_AREAS"), defaults.seed_areas)?,
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
            database_url: None,
            database_max_connections: 5,
            auth_tokens: Vec::new(),
            store_read_retries: 2,
            cors_allow_origin: "*".to_string(),
            seed_areas: true,
        }
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parses `token=uuid,token=uuid`.
fn parse_tokens(raw: &str) -> Result<Vec<(String, UserId)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (token, user) = entry.split_once('=').ok_or_else(|| ConfigError::Invalid {
                key: "AUTH_TOKENS",
                reason: format!("entry {entry:?} is not token=user-id"),
            })?;
            let token = token.trim();
            if token.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "AUTH_TOKENS",
                    reason: "empty token".to_string(),
                });
            }
            let user = user.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "AUTH_TOKENS",
                reason: format!("bad user id for token {token:?}: {e}"),
            })?;
            Ok((token.to_string(), user))
        })
        .collect()
}
