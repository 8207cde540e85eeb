//! Decryption of stored bucket secrets
//!
//! Secrets arrive from the authority as `iv:tag:ciphertext`, each part hex
//! encoded, sealed with AES-256-GCM under a key derived (SHA-256) from a
//! passphrase. Values in any other shape are returned unchanged, so
//! plaintext secrets and masked placeholders pass straight through to the
//! credential resolver.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};

use bucketsync_core::ports::ISecretDecryptor;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM implementation of [`ISecretDecryptor`]
pub struct AesGcmDecryptor {
    key: Option<[u8; 32]>,
}

impl AesGcmDecryptor {
    /// Creates a decryptor whose key is the SHA-256 of `passphrase`
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            key: Some(Sha256::digest(passphrase.as_bytes()).into()),
        }
    }

    /// Creates a decryptor keyed from an environment variable
    ///
    /// When the variable is unset, encrypted values fail to decrypt and the
    /// resolver falls back to environment credentials.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(passphrase) if !passphrase.is_empty() => Self::from_passphrase(&passphrase),
            _ => {
                tracing::debug!(var, "No secret encryption key configured");
                Self { key: None }
            }
        }
    }

    /// Returns `true` if a decryption key is available
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }
}

/// Splits `iv:tag:ciphertext` into decoded parts, or `None` if not in that format
fn parse_sealed(value: &str) -> Option<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let mut parts = value.split(':');
    let (iv, tag, data) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || data.is_empty() {
        return None;
    }
    let iv = hex::decode(iv).ok()?;
    let tag = hex::decode(tag).ok()?;
    let data = hex::decode(data).ok()?;
    (iv.len() == IV_LEN && tag.len() == TAG_LEN).then_some((iv, tag, data))
}

impl ISecretDecryptor for AesGcmDecryptor {
    fn decrypt(&self, ciphertext: &str) -> anyhow::Result<String> {
        let Some((iv, tag, data)) = parse_sealed(ciphertext.trim()) else {
            return Ok(ciphertext.to_string());
        };
        let key = self
            .key
            .ok_or_else(|| anyhow::anyhow!("Encrypted secret found but no decryption key is set"))?;

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow::anyhow!("Invalid decryption key: {e}"))?;
        let mut sealed = data;
        sealed.extend_from_slice(&tag);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| anyhow::anyhow!("Secret decryption failed: wrong key or corrupted data"))?;
        String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("Decrypted secret is not UTF-8: {e}"))
    }
}
