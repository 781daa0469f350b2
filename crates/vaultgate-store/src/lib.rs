//! # Vaultgate Store
//!
//! Storage abstraction for vaultgate: consent requests, the issued-token
//! index and revocation set, per-user audit logs, encrypted vault-key
//! records, and trust links.
//!
//! ## Key Types
//!
//! - [`Store`] - umbrella over the per-entity traits
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - in-memory storage for tests
//!
//! ## Design Notes
//!
//! - **Atomic audit batches**: `append_audit` sequences a batch in one step
//! - **First terminal write wins**: `resolve_request` only moves `Pending`
//! - **Revocations outlive erasure**: erased tokens stay in the revocation set
//! - **Ciphertext only**: vault records hold bundles, never plaintext keys

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AuditStore, InsertResult, RequestStore, RevokeResult, Store, TokenStore, TrustStore,
    VaultStore,
};
