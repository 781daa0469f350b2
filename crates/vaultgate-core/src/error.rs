//! Error types for vaultgate core.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Scope string failed to parse.
    #[error(transparent)]
    InvalidScope(#[from] ScopeError),

    /// Token lifetime was zero.
    #[error("invalid ttl: token lifetime must be positive")]
    InvalidTtl,

    /// An identifier was empty or otherwise unusable.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Reasons a scope string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("invalid scope: empty")]
    Empty,

    #[error("invalid scope {scope:?}: character {ch:?} is not allowed")]
    InvalidCharacter { scope: String, ch: char },

    #[error("invalid scope {0:?}: empty segment")]
    EmptySegment(String),

    #[error("invalid scope {0:?}: wildcard must be the final segment after a prefix")]
    MisplacedWildcard(String),

    /// Wildcards only appear on granted scopes, never on requests.
    #[error("invalid scope {0:?}: a required scope cannot contain a wildcard")]
    WildcardInRequest(String),
}

/// Typed reasons a token fails verification.
///
/// These are denials, not system faults: they are surfaced to the caller
/// as-is and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature mismatch")]
    SignatureMismatch,

    #[error("token expired at {expires_at}")]
    Expired { expires_at: i64 },

    #[error("token revoked at {revoked_at}")]
    Revoked { revoked_at: i64 },

    #[error("token scope {granted} does not cover {required}")]
    ScopeMismatch { granted: String, required: String },
}

impl ValidationError {
    /// Short, stable name of the failure, safe to write to logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Malformed(_) => "malformed",
            ValidationError::SignatureMismatch => "signature_mismatch",
            ValidationError::Expired { .. } => "expired",
            ValidationError::Revoked { .. } => "revoked",
            ValidationError::ScopeMismatch { .. } => "scope_mismatch",
        }
    }
}
