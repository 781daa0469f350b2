//! Agent-to-agent delegation.

use serde::{Deserialize, Serialize};

use crate::scope::Scope;
use crate::types::{AgentId, TokenId, UserId};

/// A user-signed assertion that `from_agent` lets `to_agent` act under
/// `scope`.
///
/// Has no lifetime of its own: it is valid only while the consent token it
/// references is live and still covers the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLink {
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub scope: Scope,
    /// The user the backing token was issued for.
    pub user_id: UserId,
    /// Backing consent token.
    pub token_id: TokenId,
    /// The user's session or vault-owner token that signed off on the
    /// delegation.
    pub signed_by: TokenId,
    pub created_at: i64,
}
