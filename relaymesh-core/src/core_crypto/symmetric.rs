//! Per-message AES-128-GCM layer
//!
//! Wire form of every ciphertext: `base64(nonce || ciphertext || tag)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::errors::{CryptoError, CryptoResult};

/// Session key length in bytes (128 bits)
pub const SESSION_KEY_LEN: usize = 16;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Fresh symmetric key for exactly one message
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn generate() -> Self {
        let key = Aes128Gcm::generate_key(&mut OsRng);
        let mut bytes = [0u8; SESSION_KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; SESSION_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn cipher(&self) -> Aes128Gcm {
        Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&self.0))
    }

    /// Encrypt raw bytes, returning base64 text
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Reverse of [`encrypt_bytes`](Self::encrypt_bytes); fails closed
    pub fn decrypt_bytes(&self, sealed: &str) -> CryptoResult<Vec<u8>> {
        let sealed = STANDARD.decode(sealed)?;
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt("ciphertext shorter than nonce".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt("authentication failed".to_string()))
    }

    pub fn encrypt_text(&self, text: &str) -> CryptoResult<String> {
        self.encrypt_bytes(text.as_bytes())
    }

    pub fn decrypt_text(&self, sealed: &str) -> CryptoResult<String> {
        let bytes = self.decrypt_bytes(sealed)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}
