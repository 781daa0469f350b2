//! # Vaultgate Vault
//!
//! Device-side cryptography for the bring-your-own-key vault.
//!
//! None of this runs on the server. The server stores and forwards the
//! [`KeyBundle`](vaultgate_core::KeyBundle)s and export envelopes produced
//! here, and never sees a passphrase, a derived key, or a plaintext vault key.
//!
//! - [`kdf`]: Argon2id passphrase derivation
//! - [`aead`]: AES-256-GCM with detached tags
//! - [`bundle`]: sealing the vault key on the passphrase and recovery paths
//! - [`export`]: single-use export envelopes addressed to an agent

pub mod aead;
pub mod bundle;
pub mod error;
pub mod exchange;
pub mod export;
pub mod kdf;

pub use aead::{AeadKey, Sealed};
pub use bundle::{open_vault_key, rewrap, seal_vault_key, RecoverySecret, VaultKey, VaultSetup};
pub use error::{Result, VaultError};
pub use exchange::{EphemeralKeyPair, SharedKey, X25519PublicKey, X25519StaticSecret};
pub use export::ExportEnvelope;
