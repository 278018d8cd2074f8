//! Vault — AES-256-GCM encryption at rest for API keys in `config.json`.
//!
//! Keys are encrypted with a randomly generated 256-bit key stored next to
//! the config (`~/.trustfall/vault.key` by default). The key file is created
//! on first encryption.
//!
//! Encrypted values are prefixed with `vault:` followed by the base64-encoded
//! nonce + ciphertext. Plain values (without the prefix) are returned as-is.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for encrypted values stored in config.
const VAULT_PREFIX: &str = "vault:";

/// Length of AES-256-GCM nonce (96 bits).
const NONCE_LEN: usize = 12;

/// Length of AES-256 key (256 bits).
const KEY_LEN: usize = 32;

/// Encrypts and decrypts secrets with a key kept in a single file.
#[derive(Debug, Clone)]
pub struct Vault {
    key_path: PathBuf,
}

impl Vault {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Encrypt a plaintext secret and return a `vault:...` string for storage.
    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let key = self.load_or_create_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow::anyhow!("cipher init: {}", e))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("encrypt: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", VAULT_PREFIX, B64.encode(&combined)))
    }

    /// Decrypt a `vault:...` string. Values without the prefix pass through.
    pub fn decrypt(&self, value: &str) -> anyhow::Result<String> {
        let Some(encoded) = value.strip_prefix(VAULT_PREFIX) else {
            return Ok(value.to_string());
        };

        let combined = B64
            .decode(encoded)
            .map_err(|e| anyhow::anyhow!("base64 decode: {}", e))?;

        if combined.len() < NONCE_LEN {
            anyhow::bail!("encrypted value too short");
        }

        let key = self.load_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow::anyhow!("cipher init: {}", e))?;

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("decrypt: {} (wrong vault.key?)", e))?;

        String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("utf8 decode: {}", e))
    }

    fn load_key(&self) -> anyhow::Result<[u8; KEY_LEN]> {
        let data = fs::read(&self.key_path).map_err(|e| {
            anyhow::anyhow!("cannot read {}: {}", self.key_path.display(), e)
        })?;
        if data.len() != KEY_LEN {
            anyhow::bail!(
                "vault.key has invalid length: {} (expected {})",
                data.len(),
                KEY_LEN
            );
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&data);
        Ok(key)
    }

    fn load_or_create_key(&self) -> anyhow::Result<[u8; KEY_LEN]> {
        if self.key_path.exists() {
            return self.load_key();
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);

        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.key_path, key)?;
        tracing::info!("Generated new vault key at {}", self.key_path.display());

        Ok(key)
    }
}

/// Returns `true` if the value looks like a vault-encrypted string.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(VAULT_PREFIX)
}
