//! Server Configuration Settings
//!
//! Configuration types for the broadcast server, loaded from environment variables.

use crate::application::services::ChannelConfig;

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

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port serving `/ws`, `/publish`, health, and metrics routes.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8090 }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Frames buffered per session before deliveries to it start failing.
    pub session_queue_capacity: usize,
    /// Send the latest topic value on subscribe.
    pub snapshot_on_subscribe: bool,
    /// Message carried by the welcome envelope.
    pub welcome_message: String,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            session_queue_capacity: 256,
            snapshot_on_subscribe: channel.snapshot_on_subscribe,
            welcome_message: channel.welcome_message,
        }
    }
}

impl From<&ChannelSettings> for ChannelConfig {
    fn from(settings: &ChannelSettings) -> Self {
        Self {
            welcome_message: settings.welcome_message.clone(),
            snapshot_on_subscribe: settings.snapshot_on_subscribe,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Listener settings.
    pub server: ServerSettings,
    /// Broadcast channel settings.
    pub channel: ChannelSettings,
}

impl ServerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = lookup("PULSE_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let server = ServerSettings {
            port: parse_env_u16(&lookup, "PULSE_SERVER_PORT", ServerSettings::default().port),
        };

        let defaults = ChannelSettings::default();
        let session_queue_capacity = parse_env_usize(
            &lookup,
            "PULSE_SESSION_QUEUE_CAPACITY",
            defaults.session_queue_capacity,
        );
        if session_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PULSE_SESSION_QUEUE_CAPACITY".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let welcome_message = match lookup("PULSE_WELCOME_MESSAGE") {
            Some(message) if message.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("PULSE_WELCOME_MESSAGE".to_string()));
            }
            Some(message) => message,
            None => defaults.welcome_message,
        };

        let channel = ChannelSettings {
            session_queue_capacity,
            snapshot_on_subscribe: parse_env_bool(
                &lookup,
                "PULSE_SNAPSHOT_ON_SUBSCRIBE",
                defaults.snapshot_on_subscribe,
            ),
            welcome_message,
        };

        Ok(Self {
            environment,
            server,
            channel,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
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

fn parse_env_u16(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
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
