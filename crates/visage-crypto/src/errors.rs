//! Token authority error types.

use thiserror::Error;

/// Errors produced by the keystore and token authority
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA key generation failed
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Key material could not be read or written
    #[error("Keystore I/O error: {0}")]
    KeystoreIo(#[from] std::io::Error),

    /// PEM encoding/decoding failed
    #[error("Key encoding error: {0}")]
    KeyEncoding(String),

    /// Unknown client id
    #[error("Invalid client credentials")]
    InvalidClient,

    /// Client exists but has been disabled
    #[error("Client is disabled")]
    DisabledClient,

    /// Secret hashing failed
    #[error("Secret hashing failed: {0}")]
    Hashing(String),

    /// Token is malformed or its signature does not verify.
    /// Both cases report identically so callers cannot distinguish them.
    #[error("Invalid access token")]
    InvalidToken,

    /// Token was valid once but has expired
    #[error("Access token expired")]
    Expired,

    /// Token uses an algorithm other than RS256
    #[error("Unexpected token algorithm: {found}")]
    InvalidAlgorithm { found: String },

    /// Client registry file is corrupt
    #[error("Client registry error: {0}")]
    Registry(String),
}

/// Result type for keystore and token operations
pub type Result<T> = std::result::Result<T, CryptoError>;
