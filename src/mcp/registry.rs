//! Bundled MCP server catalog.
//!
//! A curated list of known servers the user can install without typing a
//! command line. Search is local; installing converts the entry's template
//! into a stored [`ServerDefinition`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

use super::config::{ServerConfig, ServerDefinition};
use super::store::ServerStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub template: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub tags: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub servers: Vec<CatalogEntry>,
    pub total: usize,
    pub has_more: bool,
}

pub struct RegistryCatalog {
    entries: Vec<CatalogEntry>,
}

impl RegistryCatalog {
    /// The catalog shipped with the application.
    pub fn bundled() -> &'static RegistryCatalog {
        static CATALOG: OnceLock<RegistryCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| RegistryCatalog {
            entries: serde_json::from_str(include_str!("catalog.json"))
                .expect("bundled catalog is well-formed"),
        })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        let id_lower = id.to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.id.to_lowercase() == id_lower)
    }

    /// Case-insensitive substring search over id, name and description, with
    /// a conjunctive tag filter and offset/limit pagination.
    pub fn search(&self, options: &SearchOptions) -> SearchResult {
        let query = options
            .query
            .as_deref()
            .map(str::to_lowercase)
            .filter(|q| !q.is_empty());
        let tag_filter: HashSet<String> = options
            .tags
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.to_lowercase())
            .collect();

        let matches: Vec<CatalogEntry> = self
            .entries
            .iter()
            .filter(|entry| matches_query(entry, query.as_deref()))
            .filter(|entry| matches_tags(entry, &tag_filter))
            .cloned()
            .collect();

        let total = matches.len();
        let offset = options.offset.unwrap_or(0);
        let limit = options.limit.unwrap_or(50);
        let servers: Vec<CatalogEntry> = matches.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + limit < total;

        SearchResult {
            servers,
            total,
            has_more,
        }
    }

    /// Instantiate a catalog entry and persist it in the store. The new
    /// definition starts disabled and disconnected, waiting for the user to
    /// fill in credentials and test it.
    pub async fn install(&self, store: &ServerStore, id: &str) -> Result<ServerDefinition> {
        let entry = self
            .get(id)
            .ok_or_else(|| anyhow!("registry server not found: {id}"))?;

        let definition = ServerDefinition::new(
            format!("registry-{}", Uuid::new_v4()),
            entry.name.clone(),
            entry.template.clone(),
        );

        store.upsert(definition.clone()).await?;
        Ok(definition)
    }
}

fn matches_query(entry: &CatalogEntry, query: Option<&str>) -> bool {
    let Some(query) = query else {
        return true;
    };
    entry.id.to_lowercase().contains(query)
        || entry.name.to_lowercase().contains(query)
        || entry.description.to_lowercase().contains(query)
}

fn matches_tags(entry: &CatalogEntry, tags: &HashSet<String>) -> bool {
    if tags.is_empty() {
        return true;
    }
    let entry_tags: HashSet<String> = entry.tags.iter().map(|tag| tag.to_lowercase()).collect();
    tags.iter().all(|tag| entry_tags.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::store::{ServerStore, SERVERS_FILE_NAME};
    use tempfile::tempdir;

    #[test]
    fn bundled_catalog_parses_with_unique_ids() {
        let catalog = RegistryCatalog::bundled();
        assert!(!catalog.entries().is_empty());

        let mut seen = HashSet::new();
        for entry in catalog.entries() {
            assert!(seen.insert(entry.id.clone()), "duplicate id {}", entry.id);
        }
    }

    #[test]
    fn search_matches_description_text() {
        let catalog = RegistryCatalog::bundled();
        let result = catalog.search(&SearchOptions {
            query: Some("database".into()),
            ..Default::default()
        });
        assert!(result.total > 0);
        assert!(result
            .servers
            .iter()
            .all(|entry| format!(
                "{} {} {}",
                entry.id, entry.name, entry.description
            )
            .to_lowercase()
            .contains("database")));
    }

    #[test]
    fn tag_filter_is_conjunctive() {
        let catalog = RegistryCatalog::bundled();
        let both = catalog.search(&SearchOptions {
            tags: Some(vec!["files".into(), "local".into()]),
            ..Default::default()
        });
        for entry in &both.servers {
            assert!(entry.tags.contains(&"files".to_string()));
            assert!(entry.tags.contains(&"local".to_string()));
        }
    }

    #[test]
    fn pagination_reports_has_more() {
        let catalog = RegistryCatalog::bundled();
        let page = catalog.search(&SearchOptions {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(page.servers.len(), 2);
        assert_eq!(page.has_more, page.total > 2);

        let rest = catalog.search(&SearchOptions {
            limit: Some(100),
            offset: Some(2),
            ..Default::default()
        });
        assert_eq!(rest.servers.len(), page.total - 2);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn install_persists_a_disabled_definition() {
        let dir = tempdir().unwrap();
        let store = ServerStore::open(dir.path().join(SERVERS_FILE_NAME)).await;

        let catalog = RegistryCatalog::bundled();
        let installed = catalog.install(&store, "memory").await.unwrap();

        assert!(installed.id.starts_with("registry-"));
        assert!(!installed.enabled);
        let stored = store.get(&installed.id).await.unwrap();
        assert_eq!(stored.config, installed.config);
    }

    #[tokio::test]
    async fn install_unknown_id_is_an_error() {
        let dir = tempdir().unwrap();
        let store = ServerStore::open(dir.path().join(SERVERS_FILE_NAME)).await;
        let catalog = RegistryCatalog::bundled();
        assert!(catalog.install(&store, "no-such-entry").await.is_err());
    }
}
