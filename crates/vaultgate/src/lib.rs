//! # Vaultgate
//!
//! Consent tokens and bring-your-own-key vault records for user data that
//! agents act on.
//!
//! ## Overview
//!
//! Every read or write of a user's data by an agent needs a signed,
//! scoped, unexpired consent token. When an agent has none, the
//! [`Negotiator`] opens a consent request, notifies the user's sessions, and
//! resolves it when the user approves or denies, or when the deadline
//! passes. Every transition lands in the user's audit log before it takes
//! effect.
//!
//! The vault side stores two encrypted copies of each user's vault key
//! (passphrase path and recovery path). The server never sees a passphrase
//! or a plaintext key; derivation and decryption happen on the device with
//! [`crypto`].
//!
//! ## Key Concepts
//!
//! - **Tier**: `VaultOwner` covers every scope, `Consent` covers its scope,
//!   `Session` only confirms identity.
//! - **Scope**: dot-separated, optionally ending in `.*` on granted tokens.
//! - **First terminal write wins**: approve, deny and expiry race safely;
//!   late writers get `AlreadyResolved` and are audited as no-ops.
//! - **Fail closed**: no token is issued without its audit entries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vaultgate::{Gate, GateConfig, Negotiation, Resolution};
//! use vaultgate::core::{AgentContext, AgentId, Keypair, UserId};
//! use vaultgate::store::MemoryStore;
//!
//! async fn example() -> vaultgate::Result<()> {
//!     let gate = Gate::with_memory_notifier(
//!         Keypair::generate(),
//!         MemoryStore::new(),
//!         GateConfig::default(),
//!     );
//!     let user = UserId::new("u1")?;
//!     let ctx = AgentContext::new(user.clone(), AgentId::new("a1")?);
//!
//!     let negotiation = gate
//!         .negotiator()
//!         .request(&ctx, "attr.food.*", "meal planning", Duration::from_secs(3600))
//!         .await?;
//!
//!     if let Negotiation::Pending(mut handle) = negotiation {
//!         // On the user's device:
//!         let session = gate.issue_session_token(&user).await?;
//!         gate.negotiator()
//!             .approve(&session, &handle.request_id(), None)
//!             .await?;
//!
//!         // Back on the agent:
//!         if let Resolution::Approved(grant) = handle.wait().await? {
//!             println!("token: {}", grant.encoded());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `vaultgate::core` - ids, scopes, tiers, the token codec, records
//! - `vaultgate::store` - storage traits, SQLite and in-memory backends
//! - `vaultgate::notify` - notification fan-out
//! - `vaultgate::crypto` - device-side KDF, AEAD and export envelopes

pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod negotiator;
pub mod trust;
pub mod vault;
pub mod verifier;

// Re-export component crates
pub use vaultgate_core as core;
pub use vaultgate_notify as notify;
pub use vaultgate_store as store;
pub use vaultgate_vault as crypto;

pub use audit::AuditLog;
pub use config::{AuditConfig, GateConfig, NegotiatorConfig};
pub use error::{ErrorKind, GateError, Result};
pub use gate::{Gate, OWNER_SCOPE, SESSION_SCOPE};
pub use negotiator::{ConsentHandle, Grant, Negotiation, Negotiator, Resolution};
pub use trust::TrustLinks;
pub use vault::VaultKeys;
pub use verifier::TokenVerifier;

// Re-export commonly used core types
pub use vaultgate_core::{
    AgentContext, AgentId, AuditAction, AuditEntry, AuditOutcome, Operation, RequestId,
    RequestStatus, Scope, Tier, Token, TokenId, UserId, Verification,
};
