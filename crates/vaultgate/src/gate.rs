//! The Gate: one handle over negotiation, verification, vault keys, trust
//! links and the audit log.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use vaultgate_core::codec::encode;
use vaultgate_core::{
    AuditAction, AuditEntry, AuditRecord, Clock, Ed25519PublicKey, Holder, IssuedToken, Keypair,
    Operation, RequiredScope, Scope, SystemClock, Tier, Token, TokenCodec, UserId, Verification,
    SYSTEM_ACTOR,
};
use vaultgate_notify::{MemoryNotifier, Notifier};
use vaultgate_store::Store;

use crate::audit::AuditLog;
use crate::config::GateConfig;
use crate::error::Result;
use crate::negotiator::Negotiator;
use crate::trust::TrustLinks;
use crate::vault::VaultKeys;
use crate::verifier::TokenVerifier;

/// Scope carried by session-tier tokens.
pub const SESSION_SCOPE: &str = "session";
/// Scope carried by vault-owner tokens. The tier, not this string, is what
/// covers every data scope.
pub const OWNER_SCOPE: &str = "vault.owner";

/// The main Gate struct.
///
/// Owns the token codec and shares one store, notifier and clock across:
/// - consent negotiation ([`Negotiator`])
/// - token verification and revocation checks ([`TokenVerifier`])
/// - vault-key records ([`VaultKeys`])
/// - delegations ([`TrustLinks`])
/// - the audit log ([`AuditLog`])
pub struct Gate<S, N = MemoryNotifier> {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    codec: Arc<TokenCodec>,
    store: Arc<S>,
    notifier: Arc<N>,
    audit: Arc<AuditLog<S>>,
    verifier: Arc<TokenVerifier<S>>,
    negotiator: Arc<Negotiator<S, N>>,
    vault: VaultKeys<S>,
    trust: TrustLinks<S>,
}

impl<S: Store> Gate<S, MemoryNotifier> {
    /// A gate with the in-process notifier.
    pub fn with_memory_notifier(keypair: Keypair, store: S, config: GateConfig) -> Self {
        let notifier = MemoryNotifier::new(config.notify_capacity);
        Self::new(keypair, store, notifier, config)
    }
}

impl<S: Store, N: Notifier> Gate<S, N> {
    /// Create a gate on the system clock.
    pub fn new(keypair: Keypair, store: S, notifier: N, config: GateConfig) -> Self {
        Self::with_clock(keypair, store, notifier, config, Arc::new(SystemClock))
    }

    /// Create a gate on an explicit clock.
    pub fn with_clock(
        keypair: Keypair,
        store: S,
        notifier: N,
        config: GateConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(store);
        let notifier = Arc::new(notifier);
        let codec = Arc::new(TokenCodec::new(config.issuer.clone(), keypair));
        let audit = Arc::new(AuditLog::new(store.clone(), config.audit.clone()));
        let verifier = Arc::new(TokenVerifier::new(
            codec.clone(),
            store.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let negotiator = Arc::new(Negotiator::new(
            config.negotiator.clone(),
            codec.clone(),
            store.clone(),
            notifier.clone(),
            audit.clone(),
            verifier.clone(),
            clock.clone(),
        ));
        let vault = VaultKeys::new(
            store.clone(),
            verifier.clone(),
            config.kdf_policy,
            clock.clone(),
        );
        let trust = TrustLinks::new(
            store.clone(),
            verifier.clone(),
            audit.clone(),
            clock.clone(),
        );

        Self {
            config,
            clock,
            codec,
            store,
            notifier,
            audit,
            verifier,
            negotiator,
            vault,
            trust,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Public key tokens are signed with.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.codec.public_key()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn negotiator(&self) -> &Negotiator<S, N> {
        &self.negotiator
    }

    pub fn verifier(&self) -> &TokenVerifier<S> {
        &self.verifier
    }

    pub fn vault(&self) -> &VaultKeys<S> {
        &self.vault
    }

    pub fn trust(&self) -> &TrustLinks<S> {
        &self.trust
    }

    pub fn audit(&self) -> &AuditLog<S> {
        &self.audit
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Mint a session token for a user whose login the caller has checked.
    pub async fn issue_session_token(&self, user_id: &UserId) -> Result<String> {
        self.issue_identity(user_id, Tier::Session, SESSION_SCOPE, self.config.session_ttl)
            .await
    }

    /// Mint a vault-owner token for a user who has unlocked their vault.
    pub async fn issue_owner_token(&self, user_id: &UserId) -> Result<String> {
        self.issue_identity(user_id, Tier::VaultOwner, OWNER_SCOPE, self.config.owner_ttl)
            .await
    }

    async fn issue_identity(
        &self,
        user_id: &UserId,
        tier: Tier,
        scope: &str,
        ttl: Duration,
    ) -> Result<String> {
        let now = self.clock.now_millis();
        let token = self
            .codec
            .mint_scope(user_id, Holder::Session, tier, Scope::parse(scope)?, ttl, now)?;
        let encoded = encode(&token)?;

        let record = AuditRecord::new(AuditAction::Issued, SYSTEM_ACTOR)
            .with_scope(&token.scope)
            .with_token(token.id)
            .with_detail(tier.as_str());
        self.audit.append(user_id, record, now).await?;
        self.store
            .record_issued(&IssuedToken::from_token(&token, encoded.clone(), None))
            .await?;

        tracing::debug!(user = %user_id, %tier, token_id = %token.id, "identity token issued");
        Ok(encoded)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify a token, optionally against a required scope string.
    pub async fn verify(&self, encoded: &str, expected: Option<&str>) -> Result<Verification> {
        let expected = expected.map(RequiredScope::parse).transpose()?;
        self.verifier.verify(encoded, expected.as_ref()).await
    }

    /// Verify a token and check its tier permits `op`.
    pub async fn authorize(&self, encoded: &str, op: &Operation) -> Result<Token> {
        self.verifier.authorize(encoded, op).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit and erasure
    // ─────────────────────────────────────────────────────────────────────────

    /// The user's audit trail after `since`.
    pub async fn audit_log(&self, user_id: &UserId, since: Option<u64>) -> Result<Vec<AuditEntry>> {
        self.audit.list_for_user(user_id, since).await
    }

    /// Right to erasure.
    ///
    /// Revokes and forgets every token issued to the user and deletes their
    /// requests, trust links, vault record and audit entries. What remains is
    /// a single `Erased` tombstone continuing the user's sequence.
    pub async fn erase_user(&self, identity: &str, user_id: &UserId) -> Result<AuditEntry> {
        self.verifier.confirm_identity(identity, user_id).await?;
        let _guard = self.negotiator.forget_user(user_id).await;
        let now = self.clock.now_millis();

        let tokens = self.store.erase_tokens_for(user_id, now).await?;
        let requests = self.store.delete_requests_for(user_id).await?;
        let links = self.store.delete_trust_links_for(user_id).await?;
        let vault = self.vault.erase(user_id).await?;

        let tombstone = AuditRecord::new(AuditAction::Erased, SYSTEM_ACTOR).with_detail(format!(
            "tokens={tokens} requests={requests} trust_links={links} vault_key={vault}"
        ));
        let entry = self.audit.erase(user_id, &tombstone, now).await?;

        tracing::info!(user = %user_id, tokens, requests, links, vault, "user erased");
        Ok(entry)
    }
}

impl<S: Store + 'static, N: Notifier + 'static> Gate<S, N> {
    /// Run the expiry sweep and retention purge on `sweep_interval` until
    /// the returned task is aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let negotiator = Arc::clone(&self.negotiator);
        let period = self
            .config
            .negotiator
            .sweep_interval
            .max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = negotiator.sweep_expired().await {
                    tracing::warn!(error = %e, "expiry sweep failed");
                }
                match negotiator.purge_resolved().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "purged resolved requests"),
                    Err(e) => tracing::warn!(error = %e, "request purge failed"),
                }
            }
        })
    }
}
