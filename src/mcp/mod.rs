//! MCP (Model Context Protocol) server management.
//!
//! The renderer declares servers; this module validates them, persists the
//! list, and owns the connection lifecycle. Validation always runs before a
//! connection attempt, so a definition that cannot plausibly connect fails
//! fast with structured findings instead of a process spawn.

pub mod client;
pub mod config;
pub mod registry;
pub mod store;
pub mod validator;

pub use client::{ConnectionResult, DEFAULT_INIT_TIMEOUT};
pub use config::{
    CustomConfig, FilesystemConfig, GithubConfig, PostgresConfig, ServerConfig, ServerDefinition,
    ServerStatus, SqliteConfig,
};
pub use registry::{RegistryCatalog, SearchOptions, SearchResult};
pub use store::ServerStore;
pub use validator::{ErrorCode, McpValidator, ValidationError, ValidationResult, ValidationWarning};

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Manages configured MCP servers and their live connections.
pub struct McpManager {
    store: ServerStore,
    validator: McpValidator,
    connections: Mutex<HashMap<String, Vec<Value>>>,
    init_timeout: Duration,
}

impl McpManager {
    pub async fn open(store_path: PathBuf) -> Self {
        Self::with_store(ServerStore::open(store_path).await)
    }

    pub fn with_store(store: ServerStore) -> Self {
        Self {
            store,
            validator: McpValidator::new(),
            connections: Mutex::new(HashMap::new()),
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }

    pub fn store(&self) -> &ServerStore {
        &self.store
    }

    pub fn validator(&self) -> &McpValidator {
        &self.validator
    }

    /// Validate a stored server by id.
    pub async fn validate(&self, server_id: &str) -> Result<ValidationResult> {
        let server = self
            .store
            .get(server_id)
            .await
            .ok_or_else(|| anyhow!("MCP server not found: {server_id}"))?;
        Ok(self.validator.validate(&server).await)
    }

    /// Connect to a stored server. Validation failures and connection
    /// failures both surface as a failed [`ConnectionResult`]; only an
    /// unknown id is an error.
    pub async fn connect(&self, server_id: &str) -> Result<ConnectionResult> {
        let server = self
            .store
            .get(server_id)
            .await
            .ok_or_else(|| anyhow!("MCP server not found: {server_id}"))?;

        let validation = self.validator.validate(&server).await;
        if !validation.valid {
            let messages = self.validator.error_messages(&validation.errors);
            warn!(server = %server_id, "refusing to connect an invalid server");
            return Ok(ConnectionResult::failed(messages.join("; ")));
        }

        let result = match client::test_connection(&server, self.init_timeout).await {
            Ok(result) => result,
            Err(error) => ConnectionResult::failed(format!("{error:#}")),
        };

        if result.success {
            info!(server = %server_id, tools = result.tools.len(), "MCP server connected");
            let mut connections = self.connections.lock().await;
            connections.insert(server_id.to_string(), result.tools.clone());
        }

        Ok(result)
    }

    /// Drop a live connection; returns whether one existed.
    pub async fn disconnect(&self, server_id: &str) -> bool {
        self.connections.lock().await.remove(server_id).is_some()
    }

    /// Tools of a connected server (empty when not connected).
    pub async fn connected_tools(&self, server_id: &str) -> Vec<Value> {
        self.connections
            .lock()
            .await
            .get(server_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Re-run the connection to refresh the tool list.
    pub async fn refresh_tools(&self, server_id: &str) -> Result<ConnectionResult> {
        self.connect(server_id).await
    }

    /// Connection status per configured server.
    pub async fn status(&self) -> HashMap<String, ServerStatus> {
        let connections = self.connections.lock().await;
        self.store
            .list()
            .await
            .into_iter()
            .map(|server| {
                let status = if connections.contains_key(&server.id) {
                    ServerStatus::Connected
                } else {
                    ServerStatus::Disconnected
                };
                (server.id, status)
            })
            .collect()
    }
}
