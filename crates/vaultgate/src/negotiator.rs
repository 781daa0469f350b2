//! Consent negotiation.
//!
//! A request for `(user, scope)` either hits a live consent token, joins the
//! request already pending for that key, or opens a new one. The user then
//! approves or denies it from an identity-tier session, or the deadline
//! passes and the request expires.
//!
//! All transitions for one user run under that user's lock, and every
//! transition is audited before it is applied. The store's
//! `resolve_request` only moves requests out of `Pending`, so the first
//! terminal write wins even across processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use vaultgate_core::codec::encode;
use vaultgate_core::time::duration_millis;
use vaultgate_core::{
    AgentContext, AuditAction, AuditOutcome, AuditRecord, Clock, ConsentRequest, CoreError,
    Holder, IssuedToken, RequestId, RequestStatus, Scope, Tier, TokenCodec, TokenId, UserId,
    SYSTEM_ACTOR,
};
use vaultgate_notify::{ConsentEvent, Notifier, Subscription};
use vaultgate_store::{RevokeResult, Store};

use crate::audit::AuditLog;
use crate::config::NegotiatorConfig;
use crate::error::{GateError, Result};
use crate::verifier::TokenVerifier;

/// A consent token handed to the requesting agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub issued: IssuedToken,
    /// Export envelope attached by the approving session, passed through
    /// untouched.
    pub export: Option<Bytes>,
}

impl Grant {
    /// The token in wire form.
    pub fn encoded(&self) -> &str {
        &self.issued.encoded
    }

    pub fn token_id(&self) -> TokenId {
        self.issued.token_id
    }
}

/// How a consent request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Approved(Grant),
    /// The user said no. A normal outcome, not an error.
    Denied,
    /// Nobody answered before the deadline.
    Expired,
}

impl Resolution {
    pub fn status(&self) -> RequestStatus {
        match self {
            Resolution::Approved(_) => RequestStatus::Approved,
            Resolution::Denied => RequestStatus::Denied,
            Resolution::Expired => RequestStatus::Expired,
        }
    }
}

/// Result of [`Negotiator::request`].
#[derive(Debug)]
pub enum Negotiation {
    /// A live token already covers the scope.
    Granted(Grant),
    /// Waiting on the user.
    Pending(ConsentHandle),
}

impl Negotiation {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Negotiation::Granted(grant) => grant.issued.request_id,
            Negotiation::Pending(handle) => Some(handle.request_id()),
        }
    }
}

/// A caller's view of a pending request.
///
/// Dropping the handle, or abandoning a [`wait`](Self::wait), does not
/// affect the request.
#[derive(Debug, Clone)]
pub struct ConsentHandle {
    request_id: RequestId,
    rx: watch::Receiver<Option<Resolution>>,
}

impl ConsentHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The resolution, if there is one yet.
    pub fn poll(&self) -> Option<Resolution> {
        self.rx.borrow().clone()
    }

    /// Wait until the request resolves.
    pub async fn wait(&mut self) -> Result<Resolution> {
        let request_id = self.request_id;
        let resolution = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| GateError::Abandoned(request_id))?
            .clone();
        resolution.ok_or(GateError::Abandoned(request_id))
    }

    /// Wait up to `timeout`. `Ok(None)` if still pending.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<Resolution>> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(resolution) => resolution.map(Some),
            Err(_) => Ok(None),
        }
    }
}

type UserLocks = StdMutex<HashMap<UserId, Arc<Mutex<()>>>>;

/// Holds one user's negotiation lock. The user's entry is dropped from the
/// lock table once nobody holds or waits on it.
pub(crate) struct UserLock<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

#[derive(Default)]
struct InFlight {
    by_scope: HashMap<(UserId, Scope), RequestId>,
    waiters: HashMap<RequestId, watch::Sender<Option<Resolution>>>,
}

/// The consent state machine.
pub struct Negotiator<S, N> {
    config: NegotiatorConfig,
    codec: Arc<TokenCodec>,
    store: Arc<S>,
    notifier: Arc<N>,
    audit: Arc<AuditLog<S>>,
    verifier: Arc<TokenVerifier<S>>,
    clock: Arc<dyn Clock>,
    user_locks: UserLocks,
    in_flight: Mutex<InFlight>,
}

impl<S: Store, N: Notifier> Negotiator<S, N> {
    pub fn new(
        config: NegotiatorConfig,
        codec: Arc<TokenCodec>,
        store: Arc<S>,
        notifier: Arc<N>,
        audit: Arc<AuditLog<S>>,
        verifier: Arc<TokenVerifier<S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            codec,
            store,
            notifier,
            audit,
            verifier,
            clock,
            user_locks: StdMutex::new(HashMap::new()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub fn config(&self) -> &NegotiatorConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent side
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask for `scope` on behalf of `ctx.user_id`.
    ///
    /// Returns an existing grant when a live consent token covers the scope.
    /// Otherwise joins the request already pending for `(user, scope)`, or
    /// opens a new one and notifies the user's sessions.
    pub async fn request(
        &self,
        ctx: &AgentContext,
        scope: &str,
        purpose: &str,
        ttl: Duration,
    ) -> Result<Negotiation> {
        let requested = Scope::parse(scope)?;
        if ttl.is_zero() {
            return Err(CoreError::InvalidTtl.into());
        }

        let _guard = self.lock_user(&ctx.user_id).await;
        let now = self.clock.now_millis();

        if let Some(issued) = self.find_grant(&ctx.user_id, &requested, now).await? {
            let record = AuditRecord::new(AuditAction::Accessed, ctx.agent_id.as_str())
                .with_scope(&requested)
                .with_token(issued.token_id);
            self.audit.note(&ctx.user_id, record, now).await;
            tracing::debug!(user = %ctx.user_id, scope = %requested, token_id = %issued.token_id, "existing grant");
            return Ok(Negotiation::Granted(Grant {
                issued,
                export: None,
            }));
        }

        if let Some(pending) = self.pending_for(&ctx.user_id, &requested, now).await? {
            tracing::debug!(user = %ctx.user_id, request_id = %pending.id, agent = %ctx.agent_id, "joined pending request");
            return Ok(Negotiation::Pending(self.subscribe(&pending).await));
        }

        let request = ConsentRequest::new(
            ctx,
            requested.clone(),
            purpose,
            ttl,
            now,
            self.config.request_timeout,
        );
        let record = AuditRecord::new(AuditAction::Requested, ctx.agent_id.as_str())
            .with_scope(&requested)
            .with_request(request.id)
            .with_detail(purpose);
        self.audit.append(&ctx.user_id, record, now).await?;
        self.store.insert_request(&request).await?;

        let handle = self.subscribe(&request).await;
        tracing::info!(user = %ctx.user_id, request_id = %request.id, scope = %requested, agent = %ctx.agent_id, "consent requested");
        self.publish(&ctx.user_id, ConsentEvent::Pending { request })
            .await;
        Ok(Negotiation::Pending(handle))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User side
    // ─────────────────────────────────────────────────────────────────────────

    /// Approve a pending request and mint its consent token.
    ///
    /// `identity` must be a session or vault-owner token for the request's
    /// user. `export` is attached to the grant as-is.
    pub async fn approve(
        &self,
        identity: &str,
        request_id: &RequestId,
        export: Option<Bytes>,
    ) -> Result<Grant> {
        let request = self.load(request_id).await?;
        let approver = self
            .verifier
            .confirm_identity(identity, &request.user_id)
            .await?;
        let actor = approver.holder.as_claim().to_string();

        let _guard = self.lock_user(&request.user_id).await;
        let now = self.clock.now_millis();
        let request = self.load(request_id).await?;
        self.ensure_pending(&request, AuditAction::Approved, &actor, now)
            .await?;

        let ttl = request.requested_ttl().min(self.config.max_consent_ttl);
        let token = self.codec.mint_scope(
            &request.user_id,
            Holder::Agent(request.agent_id.clone()),
            Tier::Consent,
            request.scope.clone(),
            ttl,
            now,
        )?;
        let issued = IssuedToken::from_token(&token, encode(&token)?, Some(request.id));

        let records = [
            AuditRecord::new(AuditAction::Approved, &actor)
                .with_scope(&request.scope)
                .with_request(request.id)
                .with_token(token.id),
            AuditRecord::new(AuditAction::Issued, SYSTEM_ACTOR)
                .with_scope(&token.scope)
                .with_request(request.id)
                .with_token(token.id),
        ];
        self.audit
            .append_batch(&request.user_id, &records, now)
            .await?;

        // From here on the token is on the record. Any failure before the
        // request is resolved withdraws it again.
        if let Err(e) = self.store.record_issued(&issued).await {
            self.withdraw(&request, &issued, now).await;
            return Err(e.into());
        }
        match self
            .store
            .resolve_request(&request.id, RequestStatus::Approved, now, Some(token.id))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.withdraw(&request, &issued, now).await;
                return Err(self
                    .lost_race(&request, AuditAction::Approved, &actor, now)
                    .await);
            }
            Err(e) => {
                self.withdraw(&request, &issued, now).await;
                return Err(e.into());
            }
        }

        let grant = Grant { issued, export };
        tracing::info!(user = %request.user_id, request_id = %request.id, token_id = %token.id, "consent approved");
        self.settle(&request, Resolution::Approved(grant.clone()))
            .await;
        Ok(grant)
    }

    /// Deny a pending request.
    pub async fn deny(&self, identity: &str, request_id: &RequestId) -> Result<()> {
        let request = self.load(request_id).await?;
        let denier = self
            .verifier
            .confirm_identity(identity, &request.user_id)
            .await?;
        let actor = denier.holder.as_claim().to_string();

        let _guard = self.lock_user(&request.user_id).await;
        let now = self.clock.now_millis();
        let request = self.load(request_id).await?;
        self.ensure_pending(&request, AuditAction::Denied, &actor, now)
            .await?;

        let record = AuditRecord::new(AuditAction::Denied, &actor)
            .with_scope(&request.scope)
            .with_request(request.id);
        self.audit.append(&request.user_id, record, now).await?;

        match self
            .store
            .resolve_request(&request.id, RequestStatus::Denied, now, None)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return Err(self
                    .lost_race(&request, AuditAction::Denied, &actor, now)
                    .await);
            }
            Err(e) => {
                let retraction = AuditRecord::new(AuditAction::Denied, &actor)
                    .with_scope(&request.scope)
                    .with_request(request.id)
                    .with_outcome(AuditOutcome::Failure("storage".into()))
                    .with_detail("denial not recorded, request still pending");
                self.audit.note(&request.user_id, retraction, now).await;
                return Err(e.into());
            }
        }

        tracing::info!(user = %request.user_id, request_id = %request.id, "consent denied");
        self.settle(&request, Resolution::Denied).await;
        Ok(())
    }

    /// Revoke an issued token. Returns when it was revoked; revoking twice
    /// keeps the first time.
    pub async fn revoke(&self, identity: &str, token_id: &TokenId) -> Result<i64> {
        let issued = self
            .store
            .get_issued(token_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("token {token_id}")))?;
        let revoker = self
            .verifier
            .confirm_identity(identity, &issued.user_id)
            .await?;
        let actor = revoker.holder.as_claim();
        let now = self.clock.now_millis();

        let mut record = AuditRecord::new(AuditAction::Revoked, actor)
            .with_scope(&issued.scope)
            .with_token(issued.token_id);
        if let Some(request_id) = issued.request_id {
            record = record.with_request(request_id);
        }

        // Revocation only ever narrows access, so it is applied before the
        // audit write rather than after.
        match self.store.revoke(token_id, now).await? {
            RevokeResult::Revoked => {
                self.audit.append(&issued.user_id, record, now).await?;
                tracing::info!(user = %issued.user_id, token_id = %token_id, "token revoked");
                Ok(now)
            }
            RevokeResult::AlreadyRevoked { revoked_at } => {
                let record = record
                    .with_outcome(AuditOutcome::NoOp)
                    .with_detail("already revoked");
                self.audit.note(&issued.user_id, record, now).await;
                Ok(revoked_at)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Requests still waiting on the user, oldest first.
    ///
    /// The pull fallback for sessions that missed a notification.
    pub async fn list_pending(&self, user_id: &UserId) -> Result<Vec<ConsentRequest>> {
        let now = self.clock.now_millis();
        let pending = self
            .store
            .list_requests(user_id, Some(RequestStatus::Pending))
            .await?;
        Ok(pending
            .into_iter()
            .filter(|r| !r.is_past_deadline(now))
            .collect())
    }

    pub async fn status(&self, request_id: &RequestId) -> Result<ConsentRequest> {
        self.load(request_id).await
    }

    /// Live grants for the user.
    pub async fn list_tokens(&self, user_id: &UserId) -> Result<Vec<IssuedToken>> {
        let now = self.clock.now_millis();
        Ok(self.store.live_tokens_for(user_id, now).await?)
    }

    /// Subscribe to the user's consent events.
    pub async fn events(&self, user_id: &UserId) -> Subscription {
        self.notifier.subscribe(user_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Housekeeping
    // ─────────────────────────────────────────────────────────────────────────

    /// Expire every pending request past its deadline. Returns how many
    /// this call expired.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let overdue = self.store.list_overdue(now).await?;
        let mut expired = 0;

        for request in overdue {
            let _guard = self.lock_user(&request.user_id).await;
            let Some(current) = self.store.get_request(&request.id).await? else {
                continue;
            };
            if !current.is_pending() || !current.is_past_deadline(now) {
                continue;
            }
            match self.expire_locked(&current, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(request_id = %current.id, error = %e, "failed to expire request");
                }
            }
        }

        if expired > 0 {
            tracing::debug!(expired, "expiry sweep");
        }
        Ok(expired)
    }

    /// Drop terminal requests older than the retention window.
    pub async fn purge_resolved(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(duration_millis(self.config.request_retention));
        Ok(self.store.purge_resolved_before(cutoff).await?)
    }

    /// Drop in-memory state for a user being erased. Waiting callers see
    /// their request abandoned.
    pub(crate) async fn forget_user(&self, user_id: &UserId) -> UserLock<'_> {
        let guard = self.lock_user(user_id).await;
        let mut in_flight = self.in_flight.lock().await;
        let ids: Vec<RequestId> = in_flight
            .by_scope
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, id)| *id)
            .collect();
        in_flight.by_scope.retain(|(user, _), _| user != user_id);
        for id in ids {
            in_flight.waiters.remove(&id);
        }
        guard
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn lock_user(&self, user_id: &UserId) -> UserLock<'_> {
        let lock = {
            let mut locks = self
                .user_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user_id.clone()).or_default())
        };
        UserLock {
            locks: &self.user_locks,
            user_id: user_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of users with a lock entry.
    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn load(&self, request_id: &RequestId) -> Result<ConsentRequest> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("request {request_id}")))
    }

    /// The best live consent token whose scope contains `requested`.
    async fn find_grant(
        &self,
        user_id: &UserId,
        requested: &Scope,
        now: i64,
    ) -> Result<Option<IssuedToken>> {
        let live = self.store.live_tokens_for(user_id, now).await?;
        Ok(live
            .into_iter()
            .filter(|t| t.tier == Tier::Consent && t.scope.contains(requested))
            .max_by_key(|t| t.expires_at))
    }

    /// The request pending for `(user, scope)`, if any is still inside its
    /// deadline. Consults the in-flight index first, then the store, so
    /// requests opened before a restart are found too.
    async fn pending_for(
        &self,
        user_id: &UserId,
        requested: &Scope,
        now: i64,
    ) -> Result<Option<ConsentRequest>> {
        let known = self
            .in_flight
            .lock()
            .await
            .by_scope
            .get(&(user_id.clone(), requested.clone()))
            .copied();

        let candidate = match known {
            Some(id) => self.store.get_request(&id).await?,
            None => self
                .store
                .list_requests(user_id, Some(RequestStatus::Pending))
                .await?
                .into_iter()
                .find(|r| &r.scope == requested),
        };

        match candidate {
            Some(request) if request.is_pending() => {
                if request.is_past_deadline(now) {
                    self.expire_locked(&request, now).await?;
                    Ok(None)
                } else {
                    Ok(Some(request))
                }
            }
            _ => Ok(None),
        }
    }

    async fn subscribe(&self, request: &ConsentRequest) -> ConsentHandle {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .by_scope
            .insert((request.user_id.clone(), request.scope.clone()), request.id);
        let rx = in_flight
            .waiters
            .entry(request.id)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe();
        ConsentHandle {
            request_id: request.id,
            rx,
        }
    }

    /// Fails with `AlreadyResolved` unless the request can still be
    /// answered. A request found past its deadline is expired first.
    async fn ensure_pending(
        &self,
        request: &ConsentRequest,
        action: AuditAction,
        actor: &str,
        now: i64,
    ) -> Result<()> {
        if request.status.is_terminal() {
            return Err(self
                .late_writer(request, request.status, action, actor, now)
                .await);
        }
        if request.is_past_deadline(now) {
            self.expire_locked(request, now).await?;
            return Err(self
                .late_writer(request, RequestStatus::Expired, action, actor, now)
                .await);
        }
        Ok(())
    }

    /// Expire `request`. The caller holds the user's lock.
    async fn expire_locked(&self, request: &ConsentRequest, now: i64) -> Result<bool> {
        let record = AuditRecord::new(AuditAction::Expired, SYSTEM_ACTOR)
            .with_scope(&request.scope)
            .with_request(request.id);
        self.audit.append(&request.user_id, record, now).await?;

        if !self
            .store
            .resolve_request(&request.id, RequestStatus::Expired, now, None)
            .await?
        {
            return Ok(false);
        }

        tracing::info!(user = %request.user_id, request_id = %request.id, "consent request expired");
        self.settle(request, Resolution::Expired).await;
        Ok(true)
    }

    /// Take back a token minted for `request` whose approval did not stick.
    /// It was never handed out; revoking it keeps it from turning up as a
    /// cache hit.
    async fn withdraw(&self, request: &ConsentRequest, issued: &IssuedToken, now: i64) {
        if let Err(e) = self.store.revoke(&issued.token_id, now).await {
            tracing::error!(request_id = %request.id, token_id = %issued.token_id, error = %e, "failed to withdraw token");
            return;
        }
        let record = AuditRecord::new(AuditAction::Revoked, SYSTEM_ACTOR)
            .with_scope(&issued.scope)
            .with_request(request.id)
            .with_token(issued.token_id)
            .with_detail("approval not recorded");
        self.audit.note(&request.user_id, record, now).await;
        tracing::warn!(request_id = %request.id, token_id = %issued.token_id, "approval withdrawn");
    }

    async fn lost_race(
        &self,
        request: &ConsentRequest,
        action: AuditAction,
        actor: &str,
        now: i64,
    ) -> GateError {
        let status = match self.store.get_request(&request.id).await {
            Ok(Some(current)) => current.status,
            _ => RequestStatus::Expired,
        };
        self.late_writer(request, status, action, actor, now).await
    }

    /// Audit a call that arrived after the request was resolved.
    async fn late_writer(
        &self,
        request: &ConsentRequest,
        status: RequestStatus,
        action: AuditAction,
        actor: &str,
        now: i64,
    ) -> GateError {
        let record = AuditRecord::new(action, actor)
            .with_scope(&request.scope)
            .with_request(request.id)
            .with_outcome(AuditOutcome::NoOp)
            .with_detail(format!("already {status}"));
        self.audit.note(&request.user_id, record, now).await;
        tracing::debug!(request_id = %request.id, %status, %action, "late writer");
        GateError::AlreadyResolved {
            request_id: request.id,
            status,
        }
    }

    /// Wake waiters and tell the user's other sessions.
    async fn settle(&self, request: &ConsentRequest, resolution: Resolution) {
        let status = resolution.status();
        let waiter = {
            let mut in_flight = self.in_flight.lock().await;
            let key = (request.user_id.clone(), request.scope.clone());
            if in_flight.by_scope.get(&key) == Some(&request.id) {
                in_flight.by_scope.remove(&key);
            }
            in_flight.waiters.remove(&request.id)
        };
        if let Some(tx) = waiter {
            tx.send_replace(Some(resolution));
        }

        self.publish(
            &request.user_id,
            ConsentEvent::Resolved {
                request_id: request.id,
                status,
            },
        )
        .await;
    }

    async fn publish(&self, user_id: &UserId, event: ConsentEvent) {
        match self.notifier.publish(user_id, event).await {
            Ok(delivered) => tracing::debug!(user = %user_id, delivered, "consent event published"),
            Err(e) => tracing::warn!(user = %user_id, error = %e, "consent event not delivered"),
        }
    }
}
