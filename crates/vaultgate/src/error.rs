//! Error types for the gate services.

use thiserror::Error;

use vaultgate_core::{
    BundleError, BundlePath, CoreError, RequestId, RequestStatus, ScopeError, ValidationError,
};
use vaultgate_notify::NotifyError;
use vaultgate_store::StoreError;
use vaultgate_vault::VaultError;

/// Errors that can occur during gate operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// Token minting or identifier error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A scope string failed to parse.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// A presented token was rejected.
    #[error("token rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Notification transport error.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Device-side vault crypto error.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// A submitted key bundle does not meet policy.
    #[error("invalid {path} bundle: {source}")]
    InvalidBundle {
        path: BundlePath,
        #[source]
        source: BundleError,
    },

    /// Record already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The request already left `Pending`.
    #[error("request {request_id} already resolved as {status}")]
    AlreadyResolved {
        request_id: RequestId,
        status: RequestStatus,
    },

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The audit log could not be written; the operation was not applied.
    #[error("audit write failed after {attempts} attempts: {reason}")]
    AuditWriteFailed { attempts: u32, reason: String },

    /// The token is valid but its tier or subject does not allow this.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The request was dropped before it resolved.
    #[error("request {0} abandoned")]
    Abandoned(RequestId),
}

/// Flat error classification for transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidScope,
    InvalidTtl,
    Malformed,
    SignatureMismatch,
    Expired,
    ScopeMismatch,
    Revoked,
    AlreadyExists,
    AlreadyResolved,
    NotFound,
    DecryptionFailed,
    AuditWriteFailed,
    InvalidBundle,
    NotAuthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidScope => "invalid_scope",
            ErrorKind::InvalidTtl => "invalid_ttl",
            ErrorKind::Malformed => "malformed",
            ErrorKind::SignatureMismatch => "signature_mismatch",
            ErrorKind::Expired => "expired",
            ErrorKind::ScopeMismatch => "scope_mismatch",
            ErrorKind::Revoked => "revoked",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::AlreadyResolved => "already_resolved",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DecryptionFailed => "decryption_failed",
            ErrorKind::AuditWriteFailed => "audit_write_failed",
            ErrorKind::InvalidBundle => "invalid_bundle",
            ErrorKind::NotAuthorized => "not_authorized",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether this is a rejection of the caller's input or credentials,
    /// as opposed to a fault on our side.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ErrorKind::AuditWriteFailed | ErrorKind::Internal)
    }
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Core(e) => match e {
                CoreError::InvalidScope(_) => ErrorKind::InvalidScope,
                CoreError::InvalidTtl => ErrorKind::InvalidTtl,
                CoreError::InvalidId(_) | CoreError::DecodingError(_) => ErrorKind::Malformed,
                CoreError::EncodingError(_) => ErrorKind::Internal,
            },
            GateError::Scope(_) => ErrorKind::InvalidScope,
            GateError::Validation(e) => match e {
                ValidationError::Malformed(_) => ErrorKind::Malformed,
                ValidationError::SignatureMismatch => ErrorKind::SignatureMismatch,
                ValidationError::Expired { .. } => ErrorKind::Expired,
                ValidationError::Revoked { .. } => ErrorKind::Revoked,
                ValidationError::ScopeMismatch { .. } => ErrorKind::ScopeMismatch,
            },
            GateError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            GateError::Store(_) | GateError::Notify(_) | GateError::Abandoned(_) => {
                ErrorKind::Internal
            }
            GateError::Vault(e) => match e {
                VaultError::DecryptionFailed => ErrorKind::DecryptionFailed,
                VaultError::InvalidBundle(_) => ErrorKind::InvalidBundle,
                _ => ErrorKind::Internal,
            },
            GateError::InvalidBundle { .. } => ErrorKind::InvalidBundle,
            GateError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            GateError::AlreadyResolved { .. } => ErrorKind::AlreadyResolved,
            GateError::NotFound(_) => ErrorKind::NotFound,
            GateError::AuditWriteFailed { .. } => ErrorKind::AuditWriteFailed,
            GateError::NotAuthorized(_) => ErrorKind::NotAuthorized,
        }
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
