//! Consent tokens and verification results.
//!
//! A token is an immutable bearer credential: possession plus a valid
//! signature plus an unexpired lifetime plus a covering scope is
//! authorization. Tokens are never mutated, only re-issued.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Ed25519Signature;
use crate::error::ValidationError;
use crate::scope::{RequiredScope, Scope};
use crate::tier::{Operation, Tier};
use crate::types::{AgentId, RequestId, TokenId, UserId};

/// Who holds a token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holder {
    /// An agent acting for the user.
    Agent(AgentId),
    /// The user's own logged-in session.
    Session,
}

impl Holder {
    pub const SESSION: &'static str = "session";

    /// The holder as it appears in the `holder` claim.
    pub fn as_claim(&self) -> &str {
        match self {
            Holder::Agent(agent) => agent.as_str(),
            Holder::Session => Self::SESSION,
        }
    }

    pub fn from_claim(s: &str) -> Option<Self> {
        if s == Self::SESSION {
            return Some(Holder::Session);
        }
        AgentId::new(s).ok().map(Holder::Agent)
    }
}

impl fmt::Debug for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Holder({})", self.as_claim())
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_claim())
    }
}

/// The signed payload, in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub holder: String,
    pub tier: Tier,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
}

/// A minted token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Unique token id (`jti`).
    pub id: TokenId,
    /// Issuing system identity.
    pub issuer: String,
    /// The user the token speaks for.
    pub subject: UserId,
    /// The agent (or session) holding it.
    pub holder: Holder,
    /// Authority level.
    pub tier: Tier,
    /// Granted scope.
    pub scope: Scope,
    /// Issue time (Unix ms).
    pub issued_at: i64,
    /// Expiry (Unix ms). The token is valid strictly before this instant.
    pub expires_at: i64,
    /// Issuer signature over the canonical claims.
    pub signature: Ed25519Signature,
}

impl Token {
    pub(crate) fn claims(&self) -> TokenClaims {
        TokenClaims {
            jti: self.id.to_hex(),
            iss: self.issuer.clone(),
            sub: self.subject.as_str().to_string(),
            holder: self.holder.as_claim().to_string(),
            tier: self.tier,
            scope: self.scope.to_string(),
            iat: self.issued_at,
            exp: self.expires_at,
        }
    }

    /// Whether the token has expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether this token's tier and scope cover `required`.
    pub fn covers(&self, required: &RequiredScope) -> bool {
        self.tier.covers(&self.scope, required)
    }

    /// Whether this token may perform `op`.
    pub fn permits(&self, op: &Operation) -> bool {
        self.tier.permits(&self.scope, op)
    }
}

/// Outcome of verifying an encoded token.
///
/// Stateless checks (parse, signature, expiry, scope) come from the codec;
/// `Revoked` is only produced by a verifier that consults the revocation
/// set. Every variant other than `Valid` is a denial, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(Token),
    /// The string could not be parsed as a token.
    Malformed(String),
    /// The signature does not match the claims.
    SignatureMismatch,
    Expired(Token),
    Revoked { token: Token, revoked_at: i64 },
    ScopeMismatch { token: Token, required: RequiredScope },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    /// The authenticated token, if the signature checked out.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Verification::Valid(token)
            | Verification::Expired(token)
            | Verification::Revoked { token, .. }
            | Verification::ScopeMismatch { token, .. } => Some(token),
            Verification::Malformed(_) | Verification::SignatureMismatch => None,
        }
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<ValidationError> {
        match self {
            Verification::Valid(_) => None,
            Verification::Malformed(reason) => Some(ValidationError::Malformed(reason.clone())),
            Verification::SignatureMismatch => Some(ValidationError::SignatureMismatch),
            Verification::Expired(token) => Some(ValidationError::Expired {
                expires_at: token.expires_at,
            }),
            Verification::Revoked { revoked_at, .. } => Some(ValidationError::Revoked {
                revoked_at: *revoked_at,
            }),
            Verification::ScopeMismatch { token, required } => {
                Some(ValidationError::ScopeMismatch {
                    granted: token.scope.to_string(),
                    required: required.to_string(),
                })
            }
        }
    }

    pub fn into_result(self) -> Result<Token, ValidationError> {
        match self {
            Verification::Valid(token) => Ok(token),
            other => Err(other
                .error()
                .unwrap_or_else(|| ValidationError::Malformed("unknown".into()))),
        }
    }
}

/// The server's record of a token it minted.
///
/// Kept so that cache hits can hand back an existing grant and revocation
/// can find the token's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token_id: TokenId,
    pub user_id: UserId,
    pub holder: Holder,
    pub tier: Tier,
    pub scope: Scope,
    pub issued_at: i64,
    pub expires_at: i64,
    /// The consent request that produced it, if any.
    pub request_id: Option<RequestId>,
    /// The wire form, returned on cache hits.
    pub encoded: String,
    /// When it was revoked, if it was.
    pub revoked_at: Option<i64>,
}

impl IssuedToken {
    pub fn from_token(token: &Token, encoded: String, request_id: Option<RequestId>) -> Self {
        Self {
            token_id: token.id,
            user_id: token.subject.clone(),
            holder: token.holder.clone(),
            tier: token.tier,
            scope: token.scope.clone(),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            request_id,
            encoded,
            revoked_at: None,
        }
    }

    /// Unexpired and not revoked at `now`.
    pub fn is_live(&self, now: i64) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }

    pub fn covers(&self, required: &RequiredScope) -> bool {
        self.tier.covers(&self.scope, required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_claim_roundtrip() {
        let agent = Holder::Agent(AgentId::new("a1").unwrap());
        assert_eq!(Holder::from_claim(agent.as_claim()), Some(agent));
        assert_eq!(Holder::from_claim("session"), Some(Holder::Session));
        assert_eq!(Holder::from_claim(""), None);
    }

    #[test]
    fn test_issued_token_liveness() {
        let token = IssuedToken {
            token_id: TokenId::from_bytes([1; 16]),
            user_id: UserId::new("u1").unwrap(),
            holder: Holder::Session,
            tier: Tier::Consent,
            scope: Scope::parse("attr.food.*").unwrap(),
            issued_at: 0,
            expires_at: 1_000,
            request_id: None,
            encoded: String::new(),
            revoked_at: None,
        };
        assert!(token.is_live(999));
        assert!(!token.is_live(1_000));

        let revoked = IssuedToken {
            revoked_at: Some(10),
            ..token
        };
        assert!(!revoked.is_live(0));
    }
}
