//! Application configuration: model, defaults, and durable persistence.
//!
//! The renderer reads and writes the whole config object through the desktop
//! bridge; this module owns the on-disk representation. Sensitive fields are
//! encrypted at rest when a [`SecretCipher`] is available, and every write
//! goes through a temp-file-plus-rename protocol so a reader never observes a
//! half-written file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::secrets::{decode_secret, encode_secret, looks_encrypted, SecretCipher};

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub hedera: HederaConfig,
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub advanced: AdvancedConfig,
    pub llm_provider: LlmProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HederaConfig {
    pub account_id: String,
    pub private_key: String,
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedConfig {
    pub theme: Theme,
    pub auto_start: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Anthropic,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hedera: HederaConfig::default(),
            openai: ProviderConfig {
                api_key: String::new(),
                model: "gpt-4o".to_string(),
            },
            anthropic: ProviderConfig {
                api_key: String::new(),
                model: "claude-3-7-sonnet-latest".to_string(),
            },
            advanced: AdvancedConfig::default(),
            llm_provider: LlmProvider::Openai,
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            auto_start: false,
            log_level: LogLevel::Info,
        }
    }
}

/// Why a load fell back to defaults. Discarded by [`ConfigService::load`]
/// after logging; kept as a seam for surfacing a non-fatal notification.
#[derive(Debug, thiserror::Error)]
pub enum LoadDiagnostic {
    #[error("failed to read config file: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Persists and retrieves [`AppConfig`], protecting secrets at rest.
pub struct ConfigService {
    path: PathBuf,
    cipher: Arc<dyn SecretCipher>,
}

impl ConfigService {
    pub fn new(path: PathBuf, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { path, cipher }
    }

    /// Canonical config path in the per-app data directory.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("could not determine data directory")?;
        Ok(data_dir.join("hashchat").join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Persist the config. The caller's value is not mutated; sensitive
    /// fields are sealed on a copy. I/O errors propagate to the caller.
    pub async fn save(&self, config: &AppConfig) -> Result<()> {
        let mut persisted = config.clone();
        self.seal_sensitive(&mut persisted)?;

        let serialized = serde_json::to_string_pretty(&persisted)
            .context("failed to serialize config")?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }

        let tmp_path = self.path.with_file_name(format!(
            "{}.tmp.{:016x}",
            CONFIG_FILE_NAME,
            rand::random::<u64>()
        ));
        fs::write(&tmp_path, serialized)
            .await
            .with_context(|| format!("failed to write temp config file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to move config file into place at {}", self.path.display()))?;

        Ok(())
    }

    /// Load the config. Never fails: any read/parse problem falls back to
    /// defaults, and decryption failures leave the stored value untouched.
    pub async fn load(&self) -> AppConfig {
        let mut config = match self.try_load().await {
            Ok(config) => config,
            Err(diagnostic) => {
                warn!("falling back to default config: {diagnostic}");
                AppConfig::default()
            }
        };
        self.open_sensitive(&mut config);
        config
    }

    /// Read and merge the file over defaults. A missing file is a legitimate
    /// first run (defaults, no diagnostic); read and parse failures surface
    /// as a [`LoadDiagnostic`].
    async fn try_load(&self) -> Result<AppConfig, LoadDiagnostic> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AppConfig::default());
            }
            Err(error) => return Err(LoadDiagnostic::Unreadable(error)),
        };

        if raw.trim().is_empty() {
            return Ok(AppConfig::default());
        }

        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(merge_over_defaults(parsed)?)
    }

    fn seal_sensitive(&self, config: &mut AppConfig) -> Result<()> {
        if !self.cipher.is_available() {
            return Ok(());
        }
        for value in sensitive_fields(config) {
            if value.is_empty() || looks_encrypted(value) {
                continue;
            }
            let payload = self.cipher.encrypt_string(value)?;
            *value = encode_secret(&payload);
        }
        Ok(())
    }

    fn open_sensitive(&self, config: &mut AppConfig) {
        for value in sensitive_fields(config) {
            if value.is_empty() || !looks_encrypted(value) {
                continue;
            }
            let Some(payload) = decode_secret(value) else {
                debug!("stored secret is marked encrypted but not decodable, leaving as-is");
                continue;
            };
            match self.cipher.decrypt_string(&payload) {
                Ok(plaintext) => *value = plaintext,
                Err(error) => {
                    debug!("failed to decrypt stored secret, leaving as-is: {error}");
                }
            }
        }
    }
}

/// The three fields that must never hit disk in the clear when encryption is
/// available.
fn sensitive_fields(config: &mut AppConfig) -> [&mut String; 3] {
    [
        &mut config.hedera.private_key,
        &mut config.openai.api_key,
        &mut config.anthropic.api_key,
    ]
}

/// Shallow merge: each top-level key present in the file replaces the
/// corresponding default section, so a partial file still yields a complete
/// config.
fn merge_over_defaults(parsed: serde_json::Value) -> Result<AppConfig, serde_json::Error> {
    let serde_json::Value::Object(file_map) = parsed else {
        return serde_json::from_value(parsed);
    };

    let mut base = serde_json::to_value(AppConfig::default())?;
    if let serde_json::Value::Object(base_map) = &mut base {
        for (key, value) in file_map {
            base_map.insert(key, value);
        }
    }
    serde_json::from_value(base)
}

/// Environment overlay captured at startup. Values set in the environment
/// take precedence over the persisted config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub hedera_account_id: Option<String>,
    pub hedera_private_key: Option<String>,
    pub hedera_network: Option<Network>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: Option<String>,
    pub llm_provider: Option<LlmProvider>,
}

impl EnvOverrides {
    pub fn capture() -> Self {
        let mut overrides = Self {
            hedera_account_id: std::env::var("HEDERA_OPERATOR_ID").ok(),
            hedera_private_key: std::env::var("HEDERA_OPERATOR_KEY").ok(),
            hedera_network: std::env::var("HEDERA_NETWORK").ok().and_then(|value| {
                match value.to_lowercase().as_str() {
                    "mainnet" => Some(Network::Mainnet),
                    "testnet" => Some(Network::Testnet),
                    _ => None,
                }
            }),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: std::env::var("OPENAI_MODEL").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_model: std::env::var("ANTHROPIC_MODEL").ok(),
            llm_provider: std::env::var("LLM_PROVIDER").ok().and_then(|value| {
                match value.to_lowercase().as_str() {
                    "openai" => Some(LlmProvider::Openai),
                    "anthropic" => Some(LlmProvider::Anthropic),
                    _ => None,
                }
            }),
        };

        // With a single provider key in the environment, select that provider.
        if overrides.llm_provider.is_none() {
            match (&overrides.openai_api_key, &overrides.anthropic_api_key) {
                (Some(_), None) => overrides.llm_provider = Some(LlmProvider::Openai),
                (None, Some(_)) => overrides.llm_provider = Some(LlmProvider::Anthropic),
                _ => {}
            }
        }

        overrides
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(account_id) = &self.hedera_account_id {
            config.hedera.account_id = account_id.clone();
        }
        if let Some(private_key) = &self.hedera_private_key {
            config.hedera.private_key = private_key.clone();
        }
        if let Some(network) = self.hedera_network {
            config.hedera.network = network;
        }
        if let Some(api_key) = &self.openai_api_key {
            config.openai.api_key = api_key.clone();
        }
        if let Some(model) = &self.openai_model {
            config.openai.model = model.clone();
        }
        if let Some(api_key) = &self.anthropic_api_key {
            config.anthropic.api_key = api_key.clone();
        }
        if let Some(model) = &self.anthropic_model {
            config.anthropic.model = model.clone();
        }
        if let Some(provider) = self.llm_provider {
            config.llm_provider = provider;
        }
    }
}
