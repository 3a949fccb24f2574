/*
    Crypto - hybrid message protection

    Every router owns one RSA-2048 key pair for its process lifetime; the
    public half travels inside its Node record as SubjectPublicKeyInfo PEM.

    Per outgoing message:
    1. generate a fresh 128-bit SessionKey
    2. AES-128-GCM the text and (optionally) the file payload under it,
       each with a random 12-byte nonce prepended, then base64
    3. wrap the SessionKey with RSA-OAEP(SHA-256) under the destination's
       public key, then base64

    Only the destination can unwrap. Authentication failures and wrong keys
    surface as CryptoError, never as garbage plaintext.
*/

mod errors;
pub mod key_wrap;
pub mod keys;
pub mod symmetric;

pub use errors::{CryptoError, CryptoResult};
pub use key_wrap::{unwrap_session_key, wrap_session_key};
pub use keys::{public_key_from_pem, RelayKeyPair, RSA_KEY_BITS};
pub use symmetric::{SessionKey, NONCE_LEN, SESSION_KEY_LEN};
