//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub cors_origin: String,
    pub scorer_base_url: String,
    pub scorer_timeout: Duration,
    /// How long a `resolving` claim is honoured before another resolver may take over.
    pub resolve_claim_lease: Duration,
    pub google_client_id: String,
    pub google_tokeninfo_url: String,
    pub google_timeout: Duration,
    /// Enables `/api/auth/test_session_create` when set.
    pub test_session_token: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Recommendation Scorer ---
        let scorer_base_url = required("SCORER_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let scorer_timeout = Duration::from_secs(parse_or(&lookup, "SCORER_TIMEOUT_SECS", 10u64)?);
        let resolve_claim_lease =
            Duration::from_secs(parse_or(&lookup, "RESOLVE_CLAIM_LEASE_SECS", 60u64)?);
        if resolve_claim_lease <= scorer_timeout {
            return Err(ConfigError::InvalidValue(
                "RESOLVE_CLAIM_LEASE_SECS".to_string(),
                "must be longer than SCORER_TIMEOUT_SECS".to_string(),
            ));
        }

        // --- Identity Provider ---
        let google_client_id = required("GOOGLE_CLIENT_ID")?;
        let google_tokeninfo_url =
            lookup("GOOGLE_TOKENINFO_URL").unwrap_or_else(|| DEFAULT_TOKENINFO_URL.to_string());
        let google_timeout = Duration::from_secs(parse_or(&lookup, "GOOGLE_TIMEOUT_SECS", 5u64)?);
        let test_session_token = lookup("TEST_SESSION_TOKEN").filter(|t| !t.is_empty());

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            cors_origin,
            scorer_base_url,
            scorer_timeout,
            resolve_claim_lease,
            google_client_id,
            google_tokeninfo_url,
            google_timeout,
            test_session_token,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
