//! Vault-key records as the server sees them: ciphertext and metadata only.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::UserId;

/// AES-GCM nonce length.
pub const IV_LEN: usize = 12;
/// AES-GCM tag length.
pub const TAG_LEN: usize = 16;

/// How the user unlocks their vault on-device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Passphrase,
    Biometric,
    Passkey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Passphrase => "passphrase",
            AuthMethod::Biometric => "biometric",
            AuthMethod::Passkey => "passkey",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passphrase" => Some(AuthMethod::Passphrase),
            "biometric" => Some(AuthMethod::Biometric),
            "passkey" => Some(AuthMethod::Passkey),
            _ => None,
        }
    }
}

/// Which unlock path a bundle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundlePath {
    Passphrase,
    Recovery,
}

impl BundlePath {
    pub fn label(&self) -> &'static str {
        match self {
            BundlePath::Passphrase => "passphrase",
            BundlePath::Recovery => "recovery",
        }
    }
}

impl fmt::Display for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Argon2id cost parameters used to derive a bundle's wrapping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        let policy = KdfPolicy::default();
        Self {
            memory_kib: policy.min_memory_kib,
            iterations: policy.min_iterations,
            parallelism: policy.min_parallelism,
        }
    }
}

/// Minimum acceptable KDF cost and salt length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfPolicy {
    pub min_memory_kib: u32,
    pub min_iterations: u32,
    pub min_parallelism: u32,
    pub min_salt_len: usize,
}

impl Default for KdfPolicy {
    fn default() -> Self {
        Self {
            min_memory_kib: 19_456,
            min_iterations: 2,
            min_parallelism: 1,
            min_salt_len: 16,
        }
    }
}

impl KdfPolicy {
    /// A cheap policy for tests.
    pub fn insecure_for_tests() -> Self {
        Self {
            min_memory_kib: 64,
            min_iterations: 1,
            min_parallelism: 1,
            min_salt_len: 16,
        }
    }

    /// The cheapest params this policy accepts.
    pub fn minimum_params(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.min_memory_kib,
            iterations: self.min_iterations,
            parallelism: self.min_parallelism,
        }
    }
}

/// Why a bundle was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("ciphertext is empty")]
    EmptyCiphertext,

    #[error("iv must be {IV_LEN} bytes, got {0}")]
    IvLength(usize),

    #[error("tag must be {TAG_LEN} bytes, got {0}")]
    TagLength(usize),

    #[error("salt must be at least {min} bytes, got {got}")]
    SaltTooShort { min: usize, got: usize },

    #[error("kdf parameters below policy: {0}")]
    WeakKdf(String),
}

/// One encrypted copy of the vault key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
    pub iv: Vec<u8>,
    pub salt: Vec<u8>,
    pub kdf: KdfParams,
}

impl KeyBundle {
    /// Check shape and KDF cost. The server cannot decrypt, so this is all
    /// it can verify.
    pub fn validate(&self, policy: &KdfPolicy) -> Result<(), BundleError> {
        if self.ciphertext.is_empty() {
            return Err(BundleError::EmptyCiphertext);
        }
        if self.iv.len() != IV_LEN {
            return Err(BundleError::IvLength(self.iv.len()));
        }
        if self.tag.len() != TAG_LEN {
            return Err(BundleError::TagLength(self.tag.len()));
        }
        if self.salt.len() < policy.min_salt_len {
            return Err(BundleError::SaltTooShort {
                min: policy.min_salt_len,
                got: self.salt.len(),
            });
        }
        if self.kdf.memory_kib < policy.min_memory_kib {
            return Err(BundleError::WeakKdf(format!(
                "memory {} KiB < {}",
                self.kdf.memory_kib, policy.min_memory_kib
            )));
        }
        if self.kdf.iterations < policy.min_iterations {
            return Err(BundleError::WeakKdf(format!(
                "iterations {} < {}",
                self.kdf.iterations, policy.min_iterations
            )));
        }
        if self.kdf.parallelism < policy.min_parallelism {
            return Err(BundleError::WeakKdf(format!(
                "parallelism {} < {}",
                self.kdf.parallelism, policy.min_parallelism
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBundle")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("salt_len", &self.salt.len())
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// The per-user vault record. Two independent wrappings of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultKeyRecord {
    pub user_id: UserId,
    pub auth_method: AuthMethod,
    pub passphrase_bundle: KeyBundle,
    pub recovery_bundle: KeyBundle,
    pub created_at: i64,
    pub updated_at: i64,
}

impl VaultKeyRecord {
    pub fn bundle(&self, path: BundlePath) -> &KeyBundle {
        match path {
            BundlePath::Passphrase => &self.passphrase_bundle,
            BundlePath::Recovery => &self.recovery_bundle,
        }
    }
}
