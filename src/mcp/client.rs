//! Connection probing for MCP servers.
//!
//! `test_connection` establishes a real MCP session for custom servers (via
//! the child-process transport) and a built-in probe for filesystem servers.
//! The attempt is bounded by an init timeout so a wedged server process
//! cannot stall the caller indefinitely.

use anyhow::{anyhow, Context, Result};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::config::{CustomConfig, FilesystemConfig, ServerConfig, ServerDefinition};

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a connection attempt, shaped for direct display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub success: bool,
    pub tools: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionResult {
    pub fn ok(tools: Vec<Value>) -> Self {
        Self {
            success: true,
            tools,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tools: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Attempt a connection without registering it anywhere.
pub async fn test_connection(
    server: &ServerDefinition,
    init_timeout: Duration,
) -> Result<ConnectionResult> {
    match &server.config {
        ServerConfig::Filesystem(config) => test_filesystem(config).await,
        ServerConfig::Custom(config) => test_custom(&server.name, config, init_timeout).await,
        other => Ok(ConnectionResult::failed(format!(
            "direct connection is not supported for {} servers",
            other.type_name()
        ))),
    }
}

/// Filesystem servers are served in-process; the probe only needs the root
/// to exist.
async fn test_filesystem(config: &FilesystemConfig) -> Result<ConnectionResult> {
    let Some(root_path) = config.root_path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(ConnectionResult::failed(
            "filesystem server is missing rootPath",
        ));
    };

    if !Path::new(root_path).exists() {
        return Ok(ConnectionResult::failed(format!(
            "root path does not exist: {root_path}"
        )));
    }

    let tool = json!({
        "name": "listDirectory",
        "description": "Lists files within the configured root path",
        "inputSchema": {
            "type": "object",
            "properties": {
                "relativePath": {
                    "type": "string",
                    "description": "Relative path to inspect"
                }
            }
        }
    });

    Ok(ConnectionResult::ok(vec![tool]))
}

async fn test_custom(
    name: &str,
    config: &CustomConfig,
    init_timeout: Duration,
) -> Result<ConnectionResult> {
    let command = config
        .command
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| anyhow!("custom server '{name}' is missing command"))?;

    let args = config.args.clone();
    let cwd = config.cwd.clone();
    let env_pairs = string_env_pairs(config);

    let transport = TokioChildProcess::new(Command::new(command).configure(move |cmd| {
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        cmd.args(&args);
        if let Some(dir) = &cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &env_pairs {
            cmd.env(key, value);
        }
    }))
    .with_context(|| format!("failed to spawn MCP server '{name}'"))?;

    let handshake = async {
        let service = ()
            .serve(transport)
            .await
            .with_context(|| format!("failed to initialize MCP server '{name}'"))?;

        let tools = service
            .list_all_tools()
            .await
            .with_context(|| format!("failed to list tools of MCP server '{name}'"))?;

        let tools = tools
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
            .context("failed to serialize MCP tool")?;

        match service.cancel().await {
            Ok(reason) => debug!("MCP server '{name}' shut down: {reason:?}"),
            Err(error) => debug!("failed to shut down MCP server '{name}': {error}"),
        }

        Ok::<_, anyhow::Error>(tools)
    };

    match tokio::time::timeout(init_timeout, handshake).await {
        Ok(Ok(tools)) => Ok(ConnectionResult::ok(tools)),
        Ok(Err(error)) => Ok(ConnectionResult::failed(format!("{error:#}"))),
        Err(_) => Ok(ConnectionResult::failed(format!(
            "MCP server '{name}' did not initialize within {}s",
            init_timeout.as_secs()
        ))),
    }
}

/// Env values arrive loosely typed; numbers and booleans are stringified, the
/// rest is skipped.
fn string_env_pairs(config: &CustomConfig) -> Vec<(String, String)> {
    config
        .env
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key.clone(), text.clone())),
            Value::Number(_) | Value::Bool(_) => Some((key.clone(), value.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::PostgresConfig;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn filesystem_probe_succeeds_for_existing_root() {
        let dir = tempdir().unwrap();
        let server = ServerDefinition::new(
            "fs",
            "Files",
            ServerConfig::Filesystem(FilesystemConfig {
                root_path: Some(dir.path().to_string_lossy().into_owned()),
                ..Default::default()
            }),
        );

        let result = test_connection(&server, DEFAULT_INIT_TIMEOUT).await.unwrap();
        assert!(result.success);
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0]["name"], "listDirectory");
    }

    #[tokio::test]
    async fn filesystem_probe_fails_for_missing_root() {
        let server = ServerDefinition::new(
            "fs",
            "Files",
            ServerConfig::Filesystem(FilesystemConfig {
                root_path: Some("/nonexistent/dir".into()),
                ..Default::default()
            }),
        );

        let result = test_connection(&server, DEFAULT_INIT_TIMEOUT).await.unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("/nonexistent/dir"));
    }

    #[tokio::test]
    async fn unsupported_type_yields_failed_result() {
        let server = ServerDefinition::new(
            "pg",
            "Postgres",
            ServerConfig::Postgres(PostgresConfig::default()),
        );

        let result = test_connection(&server, DEFAULT_INIT_TIMEOUT).await.unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("postgres"));
    }

    #[tokio::test]
    async fn custom_spawn_failure_is_an_error() {
        let server = ServerDefinition::new(
            "bad",
            "Broken",
            ServerConfig::Custom(CustomConfig {
                command: Some("definitely-not-a-real-command-471".into()),
                ..Default::default()
            }),
        );

        assert!(test_connection(&server, DEFAULT_INIT_TIMEOUT).await.is_err());
    }

    #[test]
    fn env_pairs_stringify_numbers_and_booleans() {
        let config = CustomConfig {
            command: Some("npx".into()),
            env: [
                ("PORT".to_string(), json!(8080)),
                ("DEBUG".to_string(), json!(true)),
                ("NAME".to_string(), json!("svc")),
                ("IGNORED".to_string(), json!({ "nested": 1 })),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let mut pairs = string_env_pairs(&config);
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("DEBUG".to_string(), "true".to_string()),
                ("NAME".to_string(), "svc".to_string()),
                ("PORT".to_string(), "8080".to_string()),
            ]
        );
    }
}
