//! Router key pair
//!
//! RSA key material is generated once per router process. The private key
//! never leaves the process and is not serializable.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

use super::errors::{CryptoError, CryptoResult};

/// Modulus size for router key pairs
pub const RSA_KEY_BITS: usize = 2048;

#[derive(Clone)]
pub struct RelayKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RelayKeyPair {
    /// Generate a fresh 2048-bit key pair
    pub fn generate() -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// SubjectPublicKeyInfo PEM, as carried in `Node::public_key`
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }
}

impl fmt::Debug for RelayKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayKeyPair")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Parse a PEM public key received from the network
pub fn public_key_from_pem(pem: &str) -> CryptoResult<RsaPublicKey> {
    if pem.trim().is_empty() {
        return Err(CryptoError::InvalidPublicKey("empty public key".to_string()));
    }
    RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::shared_keypair;

    #[test]
    fn test_public_key_pem_roundtrip() {
        let keys = shared_keypair(0);
        let pem = keys.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let parsed = public_key_from_pem(&pem).unwrap();
        assert_eq!(&parsed, keys.public_key());
    }

    #[test]
    fn test_rejects_garbage_pem() {
        assert!(matches!(
            public_key_from_pem("not a key"),
            Err(CryptoError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            public_key_from_pem(""),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let keys = shared_keypair(0);
        let rendered = format!("{:?}", keys);
        assert!(rendered.contains("<redacted>"));
    }
}
