//! TOML-based configuration for quarry.
//!
//! Supports a config file (`quarry.toml`) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [connections.main]
//! connection_string = "Server=db01;Database=Sales;Trusted_Connection=True"
//! default_schema = "dbo"
//!
//! [connections.archive]
//! connection_string = "${ARCHIVE_DB}"
//!
//! [generator]
//! dirty_read = false
//! inline_numeric_parameters = false
//!
//! [execution]
//! stale_plan_codes = [2801, 8144]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::connection::ConnectionLocator;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Invalid connection string for `{name}`: {reason}")]
    InvalidConnectionString { name: String, reason: String },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,

    /// Statement generation options.
    pub generator: GeneratorSettings,

    /// Execution options.
    pub execution: ExecutionSettings,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// ADO-style connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,

    /// Schema used for cross-database references when an entity declares none.
    #[serde(default)]
    pub default_schema: Option<String>,
}

impl ConnectionSettings {
    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }

    /// Parse the expanded connection string into a locator.
    pub fn locator(&self, name: &str) -> Result<ConnectionLocator, SettingsError> {
        let resolved = self.resolved_connection_string()?;
        let mut locator = ConnectionLocator::parse(&resolved).map_err(|reason| {
            SettingsError::InvalidConnectionString {
                name: name.to_string(),
                reason,
            }
        })?;
        locator.default_schema = self.default_schema.clone();
        Ok(locator)
    }
}

/// Statement generation options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Emit `WITH (NOLOCK)` on read table references.
    pub dirty_read: bool,

    /// Render numeric parameters as `{=Name}` literal placeholders.
    pub inline_numeric_parameters: bool,
}

/// Execution options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Driver error codes that signal a stale cached plan.
    pub stale_plan_codes: Vec<i32>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            stale_plan_codes: vec![2801, 8144],
        }
    }
}

impl ExecutionSettings {
    pub fn is_stale_plan(&self, code: i32) -> bool {
        self.stale_plan_codes.contains(&code)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A lone `$` is kept.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            let name: String = std::iter::from_fn(|| chars.next_if(|&ch| ch != '}')).collect();
            let _ = chars.next_if_eq(&'}');
            name
        } else {
            std::iter::from_fn(|| chars.next_if(|&ch| ch.is_alphanumeric() || ch == '_')).collect()
        };

        if var_name.is_empty() {
            result.push('$');
            continue;
        }
        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
