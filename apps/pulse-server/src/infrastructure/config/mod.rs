//! Configuration Module
//!
//! Configuration loading for the broadcast server.

mod settings;

pub use settings::{ChannelSettings, ConfigError, Environment, ServerConfig, ServerSettings};
