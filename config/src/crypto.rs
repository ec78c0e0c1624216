//! At-rest protection for API keys stored in settings.toml.
//!
//! AES-256-GCM with a key derived from the machine's hostname and user, so a
//! copied settings file is useless elsewhere. Output is base64(nonce || ciphertext).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_SALT: &[u8] = b"clofii-settings-key-v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("cipher initialisation failed")]
    Cipher,
    #[error("encryption failed")]
    Encrypt,
    #[error("stored secret is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("stored secret is truncated ({0} bytes)")]
    Truncated(usize),
    #[error("stored secret could not be decrypted on this machine")]
    Decrypt,
    #[error("decrypted secret is not UTF-8")]
    Utf8,
}

fn machine_key() -> [u8; 32] {
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".to_string());
    let username = whoami::username();

    let mut hasher = Sha256::new();
    hasher.update(KEY_SALT);
    hasher.update(hostname.as_bytes());
    hasher.update(b"/");
    hasher.update(username.as_bytes());
    hasher.finalize().into()
}

fn cipher() -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(&machine_key()).map_err(|_| CryptoError::Cipher)
}

/// Seal a secret for storage.
pub fn seal(secret: &str) -> Result<String, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce_bytes);

    let ciphertext = cipher()?
        .encrypt(Nonce::from_slice(&nonce_bytes), secret.as_bytes())
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Open a secret produced by [`seal`] on the same machine.
pub fn open(sealed: &str) -> Result<String, CryptoError> {
    let raw = BASE64.decode(sealed)?;
    if raw.len() <= NONCE_LEN {
        return Err(CryptoError::Truncated(raw.len()));
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let plain = cipher()?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;
    String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
}
