//! Configuration Module
//!
//! Configuration loading for the dashboard client.

mod settings;

pub use settings::{
    ApiSettings, ClientConfig, ConfigError, ConnectionSettings, Environment, StoreSettings,
    SyncSettings,
};
