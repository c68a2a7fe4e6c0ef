//! Connection locators and the registry that maps entity connection names
//! to them.
//!
//! Only the server and catalog of a connection matter to statement
//! generation: joins across servers are rejected, joins across catalogs on
//! one server are fully qualified.

use std::collections::HashMap;

use super::settings::{Settings, SettingsError};
use crate::error::{QueryError, QueryResult};
use crate::mapping::EntityDescriptor;

/// Server and catalog parsed from an ADO-style connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLocator {
    pub server: String,
    pub database: Option<String>,
    pub default_schema: Option<String>,
}

impl ConnectionLocator {
    pub fn new(server: impl Into<String>, database: Option<&str>) -> Self {
        Self {
            server: server.into(),
            database: database.map(str::to_string),
            default_schema: None,
        }
    }

    /// Parse `Key=Value;...` pairs.
    ///
    /// Recognized keys (case-insensitive): `Server`, `Data Source`, `Address`
    /// for the host and `Database`, `Initial Catalog` for the catalog. A `tcp:`
    /// prefix and a `,port` or `:port` suffix are stripped from the host.
    pub fn parse(connection_string: &str) -> Result<Self, String> {
        let mut server = None;
        let mut database = None;

        for pair in connection_string.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "server" | "data source" | "address" | "addr" => {
                    server = Some(Self::normalize_host(value));
                }
                "database" | "initial catalog" => {
                    database = Some(value.to_string());
                }
                _ => {}
            }
        }

        let server = server
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "no server specified".to_string())?;
        Ok(Self {
            server,
            database: database.filter(|d| !d.is_empty()),
            default_schema: None,
        })
    }

    fn normalize_host(value: &str) -> String {
        let host = value
            .strip_prefix("tcp:")
            .or_else(|| value.strip_prefix("TCP:"))
            .unwrap_or(value);
        let host = host.split(',').next().unwrap_or(host);
        // Named instances (`host\instance`) keep the instance.
        let host = match host.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
            _ => host,
        };
        host.trim().to_string()
    }

    pub fn same_server(&self, other: &ConnectionLocator) -> bool {
        self.server.eq_ignore_ascii_case(&other.server)
    }

    pub fn same_database(&self, other: &ConnectionLocator) -> bool {
        match (&self.database, &other.database) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Named connection locators resolved from [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, ConnectionLocator>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every configured connection.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let mut connections = HashMap::with_capacity(settings.connections.len());
        for (name, connection) in &settings.connections {
            connections.insert(name.clone(), connection.locator(name)?);
        }
        Ok(Self { connections })
    }

    pub fn with(mut self, name: &str, locator: ConnectionLocator) -> Self {
        self.connections.insert(name.to_string(), locator);
        self
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionLocator> {
        self.connections.get(name)
    }

    /// Locator for an entity.
    ///
    /// An entity without a connection name falls back to the only configured
    /// connection; with several configured that is ambiguous.
    pub fn resolve(&self, entity: &EntityDescriptor) -> QueryResult<&ConnectionLocator> {
        match entity.connection {
            Some(name) => self
                .connections
                .get(name)
                .ok_or_else(|| QueryError::ConnectionNotDeclared(name.to_string())),
            None => {
                let mut all = self.connections.values();
                match (all.next(), all.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(QueryError::ConnectionNotDeclared(
                        entity.type_name.to_string(),
                    )),
                    (Some(_), Some(_)) => {
                        Err(QueryError::AmbiguousConnection(entity.type_name.to_string()))
                    }
                }
            }
        }
    }
}
