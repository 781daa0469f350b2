//! Error types for device-side vault crypto.

use thiserror::Error;

use vaultgate_core::BundleError;

/// Errors that can occur while deriving, sealing, or opening keys.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Authentication tag did not verify. Nothing was decrypted.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Argon2 rejected the parameters or inputs.
    #[error("key derivation error: {0}")]
    KeyDerivationError(String),

    /// Bundle metadata is unusable (bad IV or tag length, short salt).
    #[error("invalid bundle: {0}")]
    InvalidBundle(#[from] BundleError),

    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
