//! Component configuration, validated once when a component is built.

use crate::errors::OpError;
use crate::eval::{Expression, is_not_null_or_blank};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

fn default_connection_id() -> String {
    "default".to_string()
}

/// Store connection settings. Components sharing the same `id` share one client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connection_id")]
    pub id: String,
    pub database: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            database: database.into(),
            host: None,
            port: None,
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindConfig {
    pub connection: ConnectionConfig,
    pub collection: String,
    /// Optional. When absent every document in the collection is returned.
    #[serde(default)]
    pub filter: Option<Expression>,
}

impl FindConfig {
    /// # Errors
    /// Returns `OpError::Config` when the collection name is blank.
    pub fn validate(&self) -> Result<(), OpError> {
        require_not_blank(&self.collection, "collection must not be empty")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub connection: ConnectionConfig,
    pub collection: String,
    /// Selection criteria. Mandatory.
    #[serde(default)]
    pub query: Option<Expression>,
    /// Update document. Falls back to the message payload when absent or empty.
    #[serde(default)]
    pub document: Option<Expression>,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub upsert: bool,
}

impl UpdateConfig {
    /// # Errors
    /// Returns `OpError::Config` when the collection name or the query filter is blank.
    pub fn validate(&self) -> Result<(), OpError> {
        require_not_blank(&self.collection, "collection must not be empty")?;
        if !is_not_null_or_blank(self.query.as_ref()) {
            return Err(OpError::Config("query filter must not be empty".into()));
        }
        Ok(())
    }
}

fn require_not_blank(value: &str, message: &str) -> Result<(), OpError> {
    if value.trim().is_empty() {
        return Err(OpError::Config(message.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindSection {
    pub collection: String,
    #[serde(default)]
    pub filter: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSection {
    pub collection: String,
    #[serde(default)]
    pub query: Option<Expression>,
    #[serde(default)]
    pub document: Option<Expression>,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub upsert: bool,
}

/// A TOML flow file: one connection and optional find/update sections.
///
/// ```toml
/// [connection]
/// database = "shop"
///
/// [update]
/// collection = "orders"
/// query = "{ _id: 1 }"
/// many = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub find: Option<FindSection>,
    #[serde(default)]
    pub update: Option<UpdateSection>,
}

impl FlowConfig {
    /// # Errors
    /// Returns `OpError::Toml` on malformed input.
    pub fn from_toml_str(s: &str) -> Result<Self, OpError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Returns `OpError::Io` if the file cannot be read, `OpError::Toml` if it is malformed.
    pub fn load(path: &Path) -> Result<Self, OpError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    #[must_use]
    pub fn find_config(&self) -> Option<FindConfig> {
        self.find.as_ref().map(|f| FindConfig {
            connection: self.connection.clone(),
            collection: f.collection.clone(),
            filter: f.filter.clone(),
        })
    }

    #[must_use]
    pub fn update_config(&self) -> Option<UpdateConfig> {
        self.update.as_ref().map(|u| UpdateConfig {
            connection: self.connection.clone(),
            collection: u.collection.clone(),
            query: u.query.clone(),
            document: u.document.clone(),
            many: u.many,
            upsert: u.upsert,
        })
    }
}
