//! Persisted MCP server list.
//!
//! A JSON array of [`ServerDefinition`] in the app data directory, cached in
//! memory behind a mutex. Writes use the same temp-file-plus-rename protocol
//! as the config service.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use super::config::{FilesystemConfig, ServerConfig, ServerDefinition};

pub const SERVERS_FILE_NAME: &str = "mcp-servers.json";

pub struct ServerStore {
    path: PathBuf,
    cache: Mutex<Vec<ServerDefinition>>,
}

impl ServerStore {
    /// Open the store at `path`, seeding a default filesystem server on a
    /// fresh install.
    pub async fn open(path: PathBuf) -> Self {
        let mut initial = match Self::read_from_disk(&path).await {
            Ok(servers) => servers,
            Err(error) => {
                warn!("failed to read MCP servers, starting empty: {error:#}");
                Vec::new()
            }
        };

        if initial.is_empty() {
            initial = vec![Self::default_server(&path)];
            if let Err(error) = Self::write_to_disk(&path, &initial).await {
                warn!("failed to persist default MCP servers: {error:#}");
            }
        }

        Self {
            path,
            cache: Mutex::new(initial),
        }
    }

    pub async fn list(&self) -> Vec<ServerDefinition> {
        self.cache.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ServerDefinition> {
        self.cache
            .lock()
            .await
            .iter()
            .find(|server| server.id == id)
            .cloned()
    }

    /// Insert or replace by id.
    pub async fn upsert(&self, mut server: ServerDefinition) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        server.updated_at = Some(now);

        match cache.iter().position(|existing| existing.id == server.id) {
            Some(index) => {
                server.created_at = cache[index].created_at.or(Some(now));
                cache[index] = server;
            }
            None => {
                server.created_at = server.created_at.or(Some(now));
                cache.push(server);
            }
        }

        Self::write_to_disk(&self.path, &cache).await
    }

    /// Remove by id; returns whether an entry existed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut cache = self.cache.lock().await;
        let before = cache.len();
        cache.retain(|server| server.id != id);
        if cache.len() == before {
            return Ok(false);
        }
        Self::write_to_disk(&self.path, &cache).await?;
        Ok(true)
    }

    /// Replace the whole list, as the renderer's bulk save does.
    pub async fn replace_all(&self, servers: Vec<ServerDefinition>) -> Result<()> {
        let mut cache = self.cache.lock().await;
        Self::write_to_disk(&self.path, &servers).await?;
        *cache = servers;
        Ok(())
    }

    async fn read_from_disk(path: &Path) -> Result<Vec<ServerDefinition>> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(error).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        parse_servers(&raw).context("failed to parse MCP servers")
    }

    async fn write_to_disk(path: &Path, servers: &[ServerDefinition]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let serialized =
            serde_json::to_string_pretty(servers).context("failed to serialize MCP servers")?;

        let tmp_path = path.with_file_name(format!(
            "{}.tmp.{:016x}",
            SERVERS_FILE_NAME,
            rand::random::<u64>()
        ));
        fs::write(&tmp_path, serialized)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("failed to move server list into place at {}", path.display()))
    }

    fn default_server(store_path: &Path) -> ServerDefinition {
        let root = store_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let now = Utc::now();

        let mut server = ServerDefinition::new(
            "default-filesystem",
            "Local Filesystem",
            ServerConfig::Filesystem(FilesystemConfig {
                root_path: Some(root.to_string_lossy().into_owned()),
                ..Default::default()
            }),
        );
        server.enabled = true;
        server.created_at = Some(now);
        server.updated_at = Some(now);
        server
    }
}

/// Parse the stored array, recovering the `[` .. `]` slice when an editor or
/// crash left garbage around it.
fn parse_servers(raw: &str) -> Result<Vec<ServerDefinition>, serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(parsed) => Ok(parsed),
        Err(primary_error) => {
            if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
                if end > start {
                    return serde_json::from_str(&raw[start..=end]);
                }
            }
            Err(primary_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::CustomConfig;
    use tempfile::tempdir;

    fn custom(id: &str) -> ServerDefinition {
        ServerDefinition::new(
            id,
            "Custom",
            ServerConfig::Custom(CustomConfig {
                command: Some("npx".into()),
                args: vec!["-y".into(), "@modelcontextprotocol/server-memory".into()],
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn fresh_store_seeds_default_filesystem_server() {
        let dir = tempdir().unwrap();
        let store = ServerStore::open(dir.path().join(SERVERS_FILE_NAME)).await;

        let servers = store.list().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, "default-filesystem");
        assert!(servers[0].enabled);
        assert!(dir.path().join(SERVERS_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SERVERS_FILE_NAME);
        let store = ServerStore::open(path.clone()).await;

        store.upsert(custom("srv-1")).await.unwrap();
        let mut renamed = custom("srv-1");
        renamed.name = "Renamed".into();
        store.upsert(renamed).await.unwrap();

        let servers = store.list().await;
        assert_eq!(servers.len(), 2);
        let entry = store.get("srv-1").await.unwrap();
        assert_eq!(entry.name, "Renamed");
        assert!(entry.created_at.is_some());

        // Reopen from disk: the same list comes back.
        let reopened = ServerStore::open(path).await;
        assert_eq!(reopened.list().await.len(), 2);
    }

    #[tokio::test]
    async fn remove_reports_whether_entry_existed() {
        let dir = tempdir().unwrap();
        let store = ServerStore::open(dir.path().join(SERVERS_FILE_NAME)).await;

        store.upsert(custom("srv-1")).await.unwrap();
        assert!(store.remove("srv-1").await.unwrap());
        assert!(!store.remove("srv-1").await.unwrap());
    }

    #[tokio::test]
    async fn garbage_around_array_is_recovered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SERVERS_FILE_NAME);
        let servers = vec![custom("srv-1")];
        let body = serde_json::to_string(&servers).unwrap();
        std::fs::write(&path, format!("log line\n{body}\ntrailing")).unwrap();

        let store = ServerStore::open(path).await;
        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "srv-1");
    }

    #[tokio::test]
    async fn unparseable_file_falls_back_to_seeded_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SERVERS_FILE_NAME);
        std::fs::write(&path, "not json at all").unwrap();

        let store = ServerStore::open(path).await;
        let servers = store.list().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, "default-filesystem");
    }
}
