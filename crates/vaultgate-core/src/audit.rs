//! Audit records.
//!
//! An [`AuditRecord`] is what a component wants logged; the store turns it
//! into an [`AuditEntry`] by assigning the user's next sequence number and
//! a timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{RequestId, TokenId, UserId};

/// Actor recorded for system-driven transitions (expiry sweep, erasure).
pub const SYSTEM_ACTOR: &str = "system";

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Requested,
    Approved,
    Denied,
    Issued,
    Revoked,
    ValidationFailed,
    /// A request was answered from an existing grant.
    Accessed,
    /// A pending request passed its deadline.
    Expired,
    /// Right-to-erasure tombstone.
    Erased,
    /// The user let one agent act under another agent's grant.
    Delegated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Requested => "requested",
            AuditAction::Approved => "approved",
            AuditAction::Denied => "denied",
            AuditAction::Issued => "issued",
            AuditAction::Revoked => "revoked",
            AuditAction::ValidationFailed => "validation_failed",
            AuditAction::Accessed => "accessed",
            AuditAction::Expired => "expired",
            AuditAction::Erased => "erased",
            AuditAction::Delegated => "delegated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "requested" => AuditAction::Requested,
            "approved" => AuditAction::Approved,
            "denied" => AuditAction::Denied,
            "issued" => AuditAction::Issued,
            "revoked" => AuditAction::Revoked,
            "validation_failed" => AuditAction::ValidationFailed,
            "accessed" => AuditAction::Accessed,
            "expired" => AuditAction::Expired,
            "erased" => AuditAction::Erased,
            "delegated" => AuditAction::Delegated,
            _ => return None,
        })
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How it ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// The call lost a race or had nothing to do (late approve, repeat revoke).
    NoOp,
    /// Failed, with a short failure kind such as `expired`.
    Failure(String),
}

impl AuditOutcome {
    /// Compact string form used by the SQL store.
    pub fn to_storage(&self) -> String {
        match self {
            AuditOutcome::Success => "success".into(),
            AuditOutcome::NoOp => "noop".into(),
            AuditOutcome::Failure(kind) => format!("failure:{kind}"),
        }
    }

    pub fn from_storage(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditOutcome::Success),
            "noop" => Some(AuditOutcome::NoOp),
            other => other
                .strip_prefix("failure:")
                .map(|kind| AuditOutcome::Failure(kind.to_string())),
        }
    }
}

/// An audit entry before it is sequenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    /// Agent id, `session`, or `system`.
    pub actor: String,
    pub scope: Option<String>,
    pub outcome: AuditOutcome,
    pub request_id: Option<RequestId>,
    pub token_id: Option<TokenId>,
    /// Free-form context. Never token bytes or key material.
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            scope: None,
            outcome: AuditOutcome::Success,
            request_id: None,
            token_id: None,
            detail: None,
        }
    }

    pub fn with_scope(mut self, scope: impl ToString) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_request(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_token(mut self, id: TokenId) -> Self {
        self.token_id = Some(id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Sequence this record for `user_id`.
    pub fn into_entry(self, user_id: UserId, seq: u64, timestamp: i64) -> AuditEntry {
        AuditEntry {
            seq,
            user_id,
            timestamp,
            action: self.action,
            actor: self.actor,
            scope: self.scope,
            outcome: self.outcome,
            request_id: self.request_id,
            token_id: self.token_id,
            detail: self.detail,
        }
    }
}

/// A sequenced, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic per user, starting at 1.
    pub seq: u64,
    pub user_id: UserId,
    pub timestamp: i64,
    pub action: AuditAction,
    pub actor: String,
    pub scope: Option<String>,
    pub outcome: AuditOutcome,
    pub request_id: Option<RequestId>,
    pub token_id: Option<TokenId>,
    pub detail: Option<String>,
}
