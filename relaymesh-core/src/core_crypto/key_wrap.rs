//! RSA-OAEP(SHA-256) wrapping of session keys

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;

use super::errors::{CryptoError, CryptoResult};
use super::keys::{public_key_from_pem, RelayKeyPair};
use super::symmetric::SessionKey;

/// Wrap `key` under the PEM public key of the final destination
pub fn wrap_session_key(key: &SessionKey, public_key_pem: &str) -> CryptoResult<String> {
    let public = public_key_from_pem(public_key_pem)?;
    let wrapped = public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::KeyWrap(e.to_string()))?;
    Ok(STANDARD.encode(wrapped))
}

/// Recover a session key wrapped for `keys`
pub fn unwrap_session_key(wrapped: &str, keys: &RelayKeyPair) -> CryptoResult<SessionKey> {
    let wrapped = STANDARD.decode(wrapped)?;
    let raw = keys
        .private_key()
        .decrypt(Oaep::new::<Sha256>(), &wrapped)
        .map_err(|e| CryptoError::KeyUnwrap(e.to_string()))?;
    SessionKey::from_bytes(&raw)
}
