//! Secret decryption port

/// Decrypts stored credential values
///
/// Implementations return the input unchanged when it is not in their
/// encrypted format, so plaintext values pass through.
pub trait ISecretDecryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> anyhow::Result<String>;
}

/// Decryptor that returns every value unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextDecryptor;

impl ISecretDecryptor for PlaintextDecryptor {
    fn decrypt(&self, ciphertext: &str) -> anyhow::Result<String> {
        Ok(ciphertext.to_string())
    }
}
