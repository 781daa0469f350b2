//! # Vaultgate Core
//!
//! Pure types for the consent-token protocol. No I/O.
//!
//! - **Scopes**: parsed capability strings and the satisfaction rule
//! - **Tiers**: VaultOwner / Consent / Session authority levels
//! - **Tokens**: signed, self-contained bearer grants and their wire codec
//! - **Records**: consent requests, audit entries, vault-key bundles, trust links

pub mod audit;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod request;
pub mod scope;
pub mod tier;
pub mod time;
pub mod token;
pub mod trust;
pub mod types;
pub mod vault;

pub use audit::{AuditAction, AuditEntry, AuditOutcome, AuditRecord, SYSTEM_ACTOR};
pub use codec::{TokenCodec, TOKEN_PREFIX};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ScopeError, ValidationError};
pub use request::{ConsentRequest, RequestStatus};
pub use scope::{satisfies, RequiredScope, Scope};
pub use tier::{Operation, Tier};
pub use time::{Clock, ManualClock, SystemClock};
pub use token::{Holder, IssuedToken, Token, Verification};
pub use trust::TrustLink;
pub use types::{AgentContext, AgentId, RequestId, TokenId, UserId};
pub use vault::{
    AuthMethod, BundleError, BundlePath, KdfParams, KdfPolicy, KeyBundle, VaultKeyRecord,
};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
