//! Secret encryption at rest.
//!
//! Sensitive config values (private keys, API keys) are encrypted with a key
//! derived from a per-install master password before they reach disk. The
//! cipher sits behind a trait so the config layer stays testable on platforms
//! without secret storage.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use scrypt::{scrypt, Params as ScryptParams};

/// Marker prefixed to base64 ciphertext in persisted JSON. Values without it
/// are treated as plaintext (migration from unencrypted configs).
pub const ENCRYPTED_PREFIX: &str = "ENC:";

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Platform secret-encryption primitive.
pub trait SecretCipher: Send + Sync {
    /// Whether encryption is usable on this platform.
    fn is_available(&self) -> bool;

    /// Encrypt a plaintext string into an opaque byte payload.
    fn encrypt_string(&self, plaintext: &str) -> Result<Vec<u8>>;

    /// Decrypt a payload produced by [`SecretCipher::encrypt_string`].
    fn decrypt_string(&self, payload: &[u8]) -> Result<String>;
}

/// AES-256-GCM with a scrypt-derived key.
///
/// Payload layout: `salt(32) || nonce(12) || ciphertext`. Salt and nonce are
/// freshly generated per value, so encrypting the same plaintext twice yields
/// different payloads.
pub struct ScryptAesCipher {
    master_password: String,
}

impl ScryptAesCipher {
    pub fn new(master_password: impl Into<String>) -> Self {
        Self {
            master_password: master_password.into(),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; 32]> {
        let params = ScryptParams::new(15, 8, 1, 32)
            .map_err(|error| anyhow!("invalid key derivation parameters: {error}"))?;
        let mut key = [0u8; 32];
        scrypt(self.master_password.as_bytes(), salt, &params, &mut key)
            .map_err(|error| anyhow!("key derivation failed: {error}"))?;
        Ok(key)
    }
}

impl SecretCipher for ScryptAesCipher {
    fn is_available(&self) -> bool {
        !self.master_password.is_empty()
    }

    fn encrypt_string(&self, plaintext: &str) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|error| anyhow!("encryption failed: {error}"))?;

        let mut combined = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    fn decrypt_string(&self, payload: &[u8]) -> Result<String> {
        if payload.len() < SALT_LEN + NONCE_LEN {
            return Err(anyhow!("encrypted payload too short"));
        }

        let (salt, rest) = payload.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| anyhow!("decryption failed"))?;
        String::from_utf8(plaintext).map_err(|error| anyhow!("decrypted value is not UTF-8: {error}"))
    }
}

/// Cipher for platforms without secret storage. Reports unavailable; the
/// config layer then writes sensitive values as plaintext.
pub struct NoopCipher;

impl SecretCipher for NoopCipher {
    fn is_available(&self) -> bool {
        false
    }

    fn encrypt_string(&self, _plaintext: &str) -> Result<Vec<u8>> {
        Err(anyhow!("secret encryption is not available"))
    }

    fn decrypt_string(&self, _payload: &[u8]) -> Result<String> {
        Err(anyhow!("secret encryption is not available"))
    }
}

/// Wrap an encrypted payload for storage inside a JSON string field.
pub fn encode_secret(payload: &[u8]) -> String {
    format!("{}{}", ENCRYPTED_PREFIX, STANDARD.encode(payload))
}

/// Whether a stored value carries the ciphertext marker.
pub fn looks_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Recover the raw payload from a marked value. Returns `None` when the value
/// is unmarked or the base64 is invalid.
pub fn decode_secret(value: &str) -> Option<Vec<u8>> {
    let encoded = value.strip_prefix(ENCRYPTED_PREFIX)?;
    STANDARD.decode(encoded).ok()
}
