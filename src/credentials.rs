//! Encrypted credential vault.
//!
//! Service/account keyed secrets (wallet bridge pairings, registry tokens)
//! live in a single file that is encrypted as a whole, with each password
//! additionally sealed on its own. Writers are serialized by an internal
//! lock; the file goes to disk through the temp-file-plus-rename protocol.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::secrets::SecretCipher;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    service: String,
    account: String,
    encrypted_password: String,
    created_at: u64,
}

pub struct CredentialVault {
    path: PathBuf,
    cipher: Arc<dyn SecretCipher>,
    lock: Mutex<()>,
}

impl CredentialVault {
    pub fn new(path: PathBuf, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            path,
            cipher,
            lock: Mutex::new(()),
        }
    }

    /// Store a password, replacing any existing entry for the same
    /// service/account pair.
    pub async fn store(&self, service: &str, account: &str, password: &str) -> Result<()> {
        require_key(service, account)?;
        if !self.cipher.is_available() {
            return Err(anyhow!("secret encryption is not available"));
        }

        let _guard = self.lock.lock().await;
        let mut credentials = self.read_all().await?;

        let payload = self.cipher.encrypt_string(password)?;
        credentials.retain(|item| !(item.service == service && item.account == account));
        credentials.push(StoredCredential {
            service: service.to_owned(),
            account: account.to_owned(),
            encrypted_password: STANDARD.encode(payload),
            created_at: chrono::Utc::now().timestamp_millis() as u64,
        });

        self.write_all(&credentials).await
    }

    pub async fn get(&self, service: &str, account: &str) -> Result<Option<String>> {
        require_key(service, account)?;

        let _guard = self.lock.lock().await;
        let credentials = self.read_all().await?;
        let Some(credential) = credentials
            .into_iter()
            .find(|item| item.service == service && item.account == account)
        else {
            return Ok(None);
        };

        let payload = STANDARD
            .decode(&credential.encrypted_password)
            .context("stored credential is not valid base64")?;
        Ok(Some(self.cipher.decrypt_string(&payload)?))
    }

    /// Returns whether an entry existed.
    pub async fn delete(&self, service: &str, account: &str) -> Result<bool> {
        require_key(service, account)?;

        let _guard = self.lock.lock().await;
        let mut credentials = self.read_all().await?;
        let before = credentials.len();
        credentials.retain(|item| !(item.service == service && item.account == account));

        if credentials.len() == before {
            return Ok(false);
        }
        self.write_all(&credentials).await?;
        Ok(true)
    }

    /// Remove every entry of a service; returns how many were dropped.
    pub async fn clear_service(&self, service: &str) -> Result<u32> {
        if service.trim().is_empty() {
            return Err(anyhow!("service must not be empty"));
        }

        let _guard = self.lock.lock().await;
        let mut credentials = self.read_all().await?;
        let before = credentials.len();
        credentials.retain(|item| item.service != service);
        let removed = (before - credentials.len()) as u32;

        if removed > 0 {
            self.write_all(&credentials).await?;
        }
        Ok(removed)
    }

    async fn read_all(&self) -> Result<Vec<StoredCredential>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        let decrypted = self.cipher.decrypt_string(&data)?;
        serde_json::from_str(&decrypted).context("failed to parse credential vault")
    }

    async fn write_all(&self, credentials: &[StoredCredential]) -> Result<()> {
        let serialized =
            serde_json::to_string(credentials).context("failed to serialize credentials")?;
        let encrypted = self.cipher.encrypt_string(&serialized)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credentials.dat".to_string());
        let tmp_path = self
            .path
            .with_file_name(format!("{file_name}.tmp.{:016x}", rand::random::<u64>()));
        fs::write(&tmp_path, encrypted)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to move vault into place at {}", self.path.display()))
    }
}

fn require_key(service: &str, account: &str) -> Result<()> {
    if service.trim().is_empty() || account.trim().is_empty() {
        return Err(anyhow!("service and account must not be empty"));
    }
    Ok(())
}
