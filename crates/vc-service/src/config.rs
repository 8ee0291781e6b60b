//! Voice chat service configuration.
//!
//! Configuration is loaded from environment variables. Provider credentials
//! are held as `SecretString` and redacted in Debug output.

use crate::services::mode::RealtimeMode;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default RealtimeKit API base URL.
pub const DEFAULT_REALTIME_API_BASE_URL: &str = "https://api.realtime.cloudflare.com/v2";

/// Default provider request timeout in seconds.
pub const DEFAULT_REALTIME_TIMEOUT_SECONDS: u64 = 5;

/// Maximum provider request timeout in seconds.
pub const MAX_REALTIME_TIMEOUT_SECONDS: u64 = 30;

/// Voice chat service configuration.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL for the record store.
    /// Protected by `SecretString` since it may embed a password.
    pub redis_url: SecretString,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Initial realtime mode (`USE_MOCK_REALTIME`).
    pub realtime_mode: RealtimeMode,

    /// RealtimeKit API base URL.
    pub realtime_api_base_url: String,

    /// RealtimeKit organization ID (Basic auth user).
    pub realtime_org_id: String,

    /// RealtimeKit API key (Basic auth password).
    pub realtime_api_key: SecretString,

    /// RealtimeKit application ID, echoed to clients as `appId`.
    pub realtime_app_id: String,

    /// Deadline for each provider call in seconds.
    pub realtime_timeout_seconds: u64,

    /// Connection drain period on shutdown in seconds.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("realtime_mode", &self.realtime_mode)
            .field("realtime_api_base_url", &self.realtime_api_base_url)
            .field("realtime_org_id", &self.realtime_org_id)
            .field("realtime_api_key", &"[REDACTED]")
            .field("realtime_app_id", &self.realtime_app_id)
            .field("realtime_timeout_seconds", &self.realtime_timeout_seconds)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid realtime mode configuration: {0}")]
    InvalidMode(String),

    #[error("Invalid provider timeout configuration: {0}")]
    InvalidProviderTimeout(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let realtime_mode = match vars.get("USE_MOCK_REALTIME").map(|v| v.trim()) {
            None | Some("") | Some("false") => RealtimeMode::Real,
            Some("true") => RealtimeMode::Mock,
            Some(other) => {
                return Err(ConfigError::InvalidMode(format!(
                    "USE_MOCK_REALTIME must be 'true' or 'false', got '{}'",
                    other
                )))
            }
        };

        let realtime_api_base_url = vars
            .get("REALTIME_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_REALTIME_API_BASE_URL.to_string());

        let realtime_org_id = vars.get("REALTIME_ORG_ID").cloned().unwrap_or_default();

        let realtime_api_key =
            SecretString::from(vars.get("REALTIME_API_KEY").cloned().unwrap_or_default());

        let realtime_app_id = vars.get("REALTIME_KIT_APP_ID").cloned().unwrap_or_default();

        // Parse provider timeout with validation
        let realtime_timeout_seconds =
            if let Some(value_str) = vars.get("REALTIME_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidProviderTimeout(format!(
                        "REALTIME_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidProviderTimeout(
                        "REALTIME_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }

                if value > MAX_REALTIME_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidProviderTimeout(format!(
                        "REALTIME_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                        MAX_REALTIME_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_REALTIME_TIMEOUT_SECONDS
            };

        let drain_seconds = if let Some(value_str) = vars.get("VC_DRAIN_SECONDS") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "VC_DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            0
        };

        Ok(Config {
            redis_url,
            bind_address,
            realtime_mode,
            realtime_api_base_url,
            realtime_org_id,
            realtime_api_key,
            realtime_app_id,
            realtime_timeout_seconds,
            drain_seconds,
        })
    }

    /// Whether provider credentials are configured.
    pub fn has_provider_credentials(&self) -> bool {
        !self.realtime_org_id.is_empty() && !self.realtime_api_key.expose_secret().is_empty()
    }
}
