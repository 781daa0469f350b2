//! Consent requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::scope::Scope;
use crate::time::duration_millis;
use crate::types::{AgentContext, AgentId, RequestId, TokenId, UserId};

/// Lifecycle of a consent request.
///
/// Monotonic: `Pending` moves to exactly one terminal state and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "denied" => Some(RequestStatus::Denied),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request by an agent for access to one of a user's scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    /// Scope being negotiated; becomes the token's scope on approval.
    pub scope: Scope,
    /// Shown to the user in the consent prompt.
    pub purpose: String,
    /// Lifetime the agent asked for, in milliseconds. Capped at approval.
    pub ttl_ms: i64,
    pub created_at: i64,
    /// The request expires once `now >= deadline`.
    pub deadline: i64,
    pub status: RequestStatus,
    pub resolved_at: Option<i64>,
    /// Token minted on approval.
    pub token_id: Option<TokenId>,
}

impl ConsentRequest {
    /// A fresh pending request.
    pub fn new(
        ctx: &AgentContext,
        scope: Scope,
        purpose: impl Into<String>,
        ttl: Duration,
        now: i64,
        timeout: Duration,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            user_id: ctx.user_id.clone(),
            agent_id: ctx.agent_id.clone(),
            scope,
            purpose: purpose.into(),
            ttl_ms: duration_millis(ttl),
            created_at: now,
            deadline: now.saturating_add(duration_millis(timeout)),
            status: RequestStatus::Pending,
            resolved_at: None,
            token_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_past_deadline(&self, now: i64) -> bool {
        now >= self.deadline
    }

    pub fn requested_ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(now: i64) -> ConsentRequest {
        let ctx = AgentContext::new(UserId::new("u1").unwrap(), AgentId::new("a1").unwrap());
        ConsentRequest::new(
            &ctx,
            Scope::parse("attr.food.*").unwrap(),
            "meal planning",
            Duration::from_secs(3600),
            now,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_new_request_is_pending() {
        let req = request(1_000);
        assert!(req.is_pending());
        assert_eq!(req.deadline, 31_000);
        assert_eq!(req.requested_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let req = request(0);
        assert!(!req.is_past_deadline(29_999));
        assert!(req.is_past_deadline(30_000));
    }

    #[test]
    fn test_status_strings() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Denied,
            RequestStatus::Expired,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }
}
