//! Agent-to-agent delegation.
//!
//! A trust link lets one agent act under a scope on the strength of another
//! agent's consent token. The user signs off on each link with an identity
//! token. The link stores only a back-reference to the consent token; every
//! [`TrustLinks::check`] re-derives validity from it, so revoking or
//! outliving the token ends the delegation too.

use std::sync::Arc;

use vaultgate_core::{
    AgentId, AuditAction, AuditRecord, Clock, Holder, RequiredScope, Scope, Tier, TokenId,
    TrustLink, UserId, ValidationError,
};
use vaultgate_store::Store;

use crate::audit::AuditLog;
use crate::error::{GateError, Result};
use crate::verifier::TokenVerifier;

pub struct TrustLinks<S> {
    store: Arc<S>,
    verifier: Arc<TokenVerifier<S>>,
    audit: Arc<AuditLog<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> TrustLinks<S> {
    pub fn new(
        store: Arc<S>,
        verifier: Arc<TokenVerifier<S>>,
        audit: Arc<AuditLog<S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            audit,
            clock,
        }
    }

    /// Let `to_agent` act under `scope` on the strength of the consent
    /// token `backing`.
    ///
    /// `identity` is the user's session or vault-owner token and is what
    /// signs the link. `backing` must be a live consent token held by
    /// another agent whose scope contains `scope`.
    pub async fn delegate(
        &self,
        identity: &str,
        backing: &TokenId,
        to_agent: &AgentId,
        scope: &str,
    ) -> Result<TrustLink> {
        let scope = Scope::parse(scope)?;
        let issued = self
            .store
            .get_issued(backing)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("token {backing}")))?;
        let signer = self
            .verifier
            .confirm_identity(identity, &issued.user_id)
            .await?;

        let token = self
            .verifier
            .verify(&issued.encoded, None)
            .await?
            .into_result()?;
        if token.tier != Tier::Consent {
            return Err(GateError::NotAuthorized(format!(
                "a {} token cannot back a delegation",
                token.tier
            )));
        }
        let Holder::Agent(from_agent) = token.holder.clone() else {
            return Err(GateError::NotAuthorized(
                "delegation needs an agent-held token".into(),
            ));
        };
        if &from_agent == to_agent {
            return Err(GateError::NotAuthorized(format!(
                "{from_agent} cannot delegate to itself"
            )));
        }
        if !token.scope.contains(&scope) {
            return Err(ValidationError::ScopeMismatch {
                granted: token.scope.to_string(),
                required: scope.to_string(),
            }
            .into());
        }

        let now = self.clock.now_millis();
        let link = TrustLink {
            from_agent,
            to_agent: to_agent.clone(),
            scope,
            user_id: token.subject.clone(),
            token_id: token.id,
            signed_by: signer.id,
            created_at: now,
        };

        let record = AuditRecord::new(AuditAction::Delegated, signer.holder.as_claim())
            .with_scope(&link.scope)
            .with_token(link.token_id)
            .with_detail(format!("{} -> {}", link.from_agent, link.to_agent));
        self.audit.append(&link.user_id, record, now).await?;
        self.store.put_trust_link(&link).await?;

        tracing::info!(
            user = %link.user_id,
            from = %link.from_agent,
            to = %link.to_agent,
            scope = %link.scope,
            "trust link created"
        );
        Ok(link)
    }

    /// A link letting `agent` act under `scope` for `user_id`, if one is
    /// currently backed by a live token.
    pub async fn check(
        &self,
        user_id: &UserId,
        agent: &AgentId,
        scope: &str,
    ) -> Result<Option<TrustLink>> {
        let required = RequiredScope::parse(scope)?;
        let now = self.clock.now_millis();

        for link in self.store.list_trust_links(user_id).await? {
            if &link.to_agent != agent || !link.scope.satisfies(&required) {
                continue;
            }
            let Some(backing) = self.store.get_issued(&link.token_id).await? else {
                continue;
            };
            if backing.is_live(now) && backing.covers(&required) {
                return Ok(Some(link));
            }
        }
        Ok(None)
    }

    pub async fn list(&self, user_id: &UserId) -> Result<Vec<TrustLink>> {
        Ok(self.store.list_trust_links(user_id).await?)
    }
}
