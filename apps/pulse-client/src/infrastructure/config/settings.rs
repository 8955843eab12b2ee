//! Client Configuration Settings
//!
//! Configuration types for the dashboard client, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use pulse_protocol::Topic;

use crate::application::services::{ConnectionConfig, SyncConfig};

const DEV_WS_URL: &str = "ws://localhost:8090/ws";
const DEV_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_STORE_PATH: &str = ".pulse/client-store.json";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Production deployment.
    Production,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Check if this is the production environment.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Broadcast server connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// WebSocket endpoint.
    pub ws_url: String,
    /// First reconnect delay; doubles on each failure.
    pub reconnect_base_delay: Duration,
    /// Failed attempts before reconnecting stops.
    pub reconnect_max_attempts: u32,
}

/// Dashboard API settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL the queue delivers actions to.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Snapshot file.
    pub path: PathBuf,
}

/// Offline sync settings.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Failed deliveries before an action becomes terminal.
    pub retry_cap: u32,
    /// Fail most 4xx rejections immediately.
    pub classify_client_errors: bool,
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Broadcast server connection.
    pub connection: ConnectionSettings,
    /// Dashboard API.
    pub api: ApiSettings,
    /// Durable store.
    pub store: StoreSettings,
    /// Offline sync.
    pub sync: SyncSettings,
    /// Topics subscribed at startup.
    pub topics: Vec<Topic>,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = lookup("PULSE_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let connection = ConnectionSettings {
            ws_url: required_in_production(&lookup, environment, "PULSE_WS_URL", DEV_WS_URL)?,
            reconnect_base_delay: Duration::from_millis(parse_env_u64(
                &lookup,
                "PULSE_RECONNECT_BASE_DELAY_MS",
                1000,
            )),
            reconnect_max_attempts: parse_env_u32(&lookup, "PULSE_RECONNECT_MAX_ATTEMPTS", 5),
        };
        if connection.reconnect_base_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PULSE_RECONNECT_BASE_DELAY_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let api = ApiSettings {
            base_url: required_in_production(
                &lookup,
                environment,
                "PULSE_API_BASE_URL",
                DEV_API_BASE_URL,
            )?,
            timeout: Duration::from_secs(parse_env_u64(&lookup, "PULSE_API_TIMEOUT_SECS", 10)),
        };

        let store = StoreSettings {
            path: lookup("PULSE_STORE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_STORE_PATH), PathBuf::from),
        };

        let defaults = SyncConfig::default();
        let sync = SyncSettings {
            retry_cap: parse_env_u32(&lookup, "PULSE_SYNC_RETRY_CAP", defaults.retry_cap),
            classify_client_errors: parse_env_bool(
                &lookup,
                "PULSE_SYNC_CLASSIFY_CLIENT_ERRORS",
                defaults.classify_client_errors,
            ),
        };
        if sync.retry_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PULSE_SYNC_RETRY_CAP".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let topics = parse_topics(lookup("PULSE_TOPICS").as_deref().unwrap_or("price,trade"))?;

        Ok(Self {
            environment,
            connection,
            api,
            store,
            sync,
            topics,
        })
    }

    /// Connection manager configuration.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            self.connection.ws_url.clone(),
            self.connection.reconnect_base_delay,
            self.connection.reconnect_max_attempts,
        )
    }

    /// Offline sync configuration.
    #[must_use]
    pub const fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            retry_cap: self.sync.retry_cap,
            classify_client_errors: self.sync.classify_client_errors,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn required_in_production(
    lookup: &impl Fn(&str) -> Option<String>,
    environment: Environment,
    key: &str,
    dev_default: &str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(value),
        None if environment.is_production() => Err(ConfigError::MissingEnvVar(key.to_string())),
        None => Ok(dev_default.to_string()),
    }
}

fn parse_topics(raw: &str) -> Result<Vec<Topic>, ConfigError> {
    let mut topics = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let topic: Topic = name.parse().map_err(|e| ConfigError::InvalidValue {
            key: "PULSE_TOPICS".to_string(),
            reason: format!("{e}"),
        })?;
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    Ok(topics)
}

fn parse_env_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| {
        match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        }
    })
}
