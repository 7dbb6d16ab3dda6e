//! MCP server configuration types.
//!
//! A server definition is what the renderer persists and edits; the `config`
//! payload is a sum type keyed by the wire `type` tag, one variant per
//! supported server kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A configured MCP server as stored on disk and shown in the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub status: ServerStatus,
    /// Tool descriptors from the last successful connection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    pub config: ServerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServerDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: false,
            status: ServerStatus::Disconnected,
            tools: Vec::new(),
            config,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Per-type configuration payload, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerConfig {
    Filesystem(FilesystemConfig),
    Github(GithubConfig),
    Postgres(PostgresConfig),
    Sqlite(SqliteConfig),
    Custom(CustomConfig),
}

impl ServerConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerConfig::Filesystem(_) => "filesystem",
            ServerConfig::Github(_) => "github",
            ServerConfig::Postgres(_) => "postgres",
            ServerConfig::Sqlite(_) => "sqlite",
            ServerConfig::Custom(_) => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FilesystemConfig {
    pub root_path: Option<String>,
    pub allowed_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubConfig {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PostgresConfig {
    pub host: Option<String>,
    /// Wide on purpose: out-of-range values must reach the validator instead
    /// of failing deserialization.
    pub port: Option<u32>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SqliteConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Values are loosely typed: the renderer may send numbers or booleans,
    /// and the validator reports those rather than the deserializer.
    pub env: BTreeMap<String, serde_json::Value>,
    pub cwd: Option<String>,
}
