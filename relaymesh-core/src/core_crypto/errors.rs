use thiserror::Error;

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key encoding failed: {0}")]
    KeyEncoding(String),

    #[error("Invalid session key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// AEAD authentication failed or ciphertext truncated
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Key wrap failed: {0}")]
    KeyWrap(String),

    #[error("Key unwrap failed: {0}")]
    KeyUnwrap(String),

    #[error("Invalid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Decrypted text is not valid UTF-8")]
    InvalidUtf8,
}
