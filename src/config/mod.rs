//! Configuration module for quarry.
//!
//! Handles connection configuration, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{ConnectionLocator, ConnectionRegistry};
pub use settings::{
    expand_env_vars, ConnectionSettings, ExecutionSettings, GeneratorSettings, Settings,
    SettingsError,
};
