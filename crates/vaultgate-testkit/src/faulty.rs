//! A store wrapper that fails audit writes and request resolutions on
//! demand.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;

use vaultgate_core::{
    AuditEntry, AuditRecord, ConsentRequest, IssuedToken, RequestId, RequestStatus, TokenId,
    TrustLink, UserId, VaultKeyRecord,
};
use vaultgate_store::{
    AuditStore, InsertResult, RequestStore, Result, RevokeResult, StoreError, TokenStore,
    TrustStore, VaultStore,
};

const ALWAYS: u32 = u32::MAX;

/// Delegates to `S`, except that `append_audit` and `erase_audit` fail while
/// audit failures are armed, and `resolve_request` fails while resolve
/// failures are armed. Reads are never affected.
pub struct FaultyStore<S> {
    inner: S,
    failures_left: AtomicU32,
    resolve_failures_left: AtomicU32,
    injected: AtomicU64,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(0),
            resolve_failures_left: AtomicU32::new(0),
            injected: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail every audit write until [`heal`](Self::heal).
    pub fn fail_audit(&self) {
        self.failures_left.store(ALWAYS, Ordering::SeqCst);
    }

    /// Fail the next `n` audit writes.
    pub fn fail_next_audit(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `resolve_request`.
    pub fn fail_next_resolve(&self, n: u32) {
        self.resolve_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failures_left.store(0, Ordering::SeqCst);
        self.resolve_failures_left.store(0, Ordering::SeqCst);
    }

    /// How many writes have been failed so far.
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    fn trip(&self) -> Result<()> {
        self.trip_on(&self.failures_left, "injected audit write failure")
    }

    fn trip_on(&self, counter: &AtomicU32, message: &'static str) -> Result<()> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok();

        if armed {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Io(std::io::Error::other(message)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: AuditStore> AuditStore for FaultyStore<S> {
    async fn append_audit(
        &self,
        user_id: &UserId,
        records: &[AuditRecord],
        at: i64,
    ) -> Result<Vec<AuditEntry>> {
        self.trip()?;
        self.inner.append_audit(user_id, records, at).await
    }

    async fn list_audit(&self, user_id: &UserId, since: Option<u64>) -> Result<Vec<AuditEntry>> {
        self.inner.list_audit(user_id, since).await
    }

    async fn erase_audit(
        &self,
        user_id: &UserId,
        tombstone: &AuditRecord,
        at: i64,
    ) -> Result<AuditEntry> {
        self.trip()?;
        self.inner.erase_audit(user_id, tombstone, at).await
    }
}

#[async_trait]
impl<S: VaultStore> VaultStore for FaultyStore<S> {
    async fn insert_vault_key(&self, record: &VaultKeyRecord) -> Result<InsertResult> {
        self.inner.insert_vault_key(record).await
    }

    async fn get_vault_key(&self, user_id: &UserId) -> Result<Option<VaultKeyRecord>> {
        self.inner.get_vault_key(user_id).await
    }

    async fn replace_vault_key(&self, record: &VaultKeyRecord) -> Result<()> {
        self.inner.replace_vault_key(record).await
    }

    async fn delete_vault_key(&self, user_id: &UserId) -> Result<bool> {
        self.inner.delete_vault_key(user_id).await
    }
}

#[async_trait]
impl<S: RequestStore> RequestStore for FaultyStore<S> {
    async fn insert_request(&self, request: &ConsentRequest) -> Result<()> {
        self.inner.insert_request(request).await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<ConsentRequest>> {
        self.inner.get_request(id).await
    }

    async fn resolve_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        resolved_at: i64,
        token_id: Option<TokenId>,
    ) -> Result<bool> {
        self.trip_on(&self.resolve_failures_left, "injected resolve failure")?;
        self.inner
            .resolve_request(id, status, resolved_at, token_id)
            .await
    }

    async fn list_requests(
        &self,
        user_id: &UserId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ConsentRequest>> {
        self.inner.list_requests(user_id, status).await
    }

    async fn list_overdue(&self, now: i64) -> Result<Vec<ConsentRequest>> {
        self.inner.list_overdue(now).await
    }

    async fn purge_resolved_before(&self, cutoff: i64) -> Result<usize> {
        self.inner.purge_resolved_before(cutoff).await
    }

    async fn delete_requests_for(&self, user_id: &UserId) -> Result<usize> {
        self.inner.delete_requests_for(user_id).await
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for FaultyStore<S> {
    async fn record_issued(&self, token: &IssuedToken) -> Result<()> {
        self.inner.record_issued(token).await
    }

    async fn get_issued(&self, id: &TokenId) -> Result<Option<IssuedToken>> {
        self.inner.get_issued(id).await
    }

    async fn live_tokens_for(&self, user_id: &UserId, now: i64) -> Result<Vec<IssuedToken>> {
        self.inner.live_tokens_for(user_id, now).await
    }

    async fn revoke(&self, id: &TokenId, at: i64) -> Result<RevokeResult> {
        self.inner.revoke(id, at).await
    }

    async fn revoked_at(&self, id: &TokenId) -> Result<Option<i64>> {
        self.inner.revoked_at(id).await
    }

    async fn erase_tokens_for(&self, user_id: &UserId, at: i64) -> Result<usize> {
        self.inner.erase_tokens_for(user_id, at).await
    }
}

#[async_trait]
impl<S: TrustStore> TrustStore for FaultyStore<S> {
    async fn put_trust_link(&self, link: &TrustLink) -> Result<()> {
        self.inner.put_trust_link(link).await
    }

    async fn list_trust_links(&self, user_id: &UserId) -> Result<Vec<TrustLink>> {
        self.inner.list_trust_links(user_id).await
    }

    async fn delete_trust_links_for(&self, user_id: &UserId) -> Result<usize> {
        self.inner.delete_trust_links_for(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgate_core::AuditAction;
    use vaultgate_store::MemoryStore;

    fn record() -> AuditRecord {
        AuditRecord::new(AuditAction::Requested, "a1")
    }

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let store = FaultyStore::new(MemoryStore::new());
        let u = UserId::new("u1").unwrap();
        store.fail_next_audit(2);

        assert!(store.append_audit(&u, &[record()], 1).await.is_err());
        assert!(store.append_audit(&u, &[record()], 2).await.is_err());
        let entries = store.append_audit(&u, &[record()], 3).await.unwrap();

        assert_eq!(entries[0].seq, 1);
        assert_eq!(store.injected_failures(), 2);
    }

    #[tokio::test]
    async fn test_fail_until_healed() {
        let store = FaultyStore::new(MemoryStore::new());
        let u = UserId::new("u1").unwrap();
        store.fail_audit();

        for at in 0..5 {
            assert!(store.append_audit(&u, &[record()], at).await.is_err());
        }
        assert!(store.list_audit(&u, None).await.unwrap().is_empty());

        store.heal();
        assert!(store.append_audit(&u, &[record()], 9).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_failure_leaves_request_pending() {
        let store = FaultyStore::new(MemoryStore::new());
        let ctx = vaultgate_core::AgentContext::new(
            UserId::new("u1").unwrap(),
            vaultgate_core::AgentId::new("a1").unwrap(),
        );
        let request = ConsentRequest::new(
            &ctx,
            vaultgate_core::Scope::parse("attr.food.*").unwrap(),
            "p",
            std::time::Duration::from_secs(60),
            0,
            std::time::Duration::from_secs(30),
        );
        store.insert_request(&request).await.unwrap();
        store.fail_next_resolve(1);

        assert!(store
            .resolve_request(&request.id, RequestStatus::Denied, 1, None)
            .await
            .is_err());
        assert!(store.get_request(&request.id).await.unwrap().unwrap().is_pending());
        assert!(store
            .resolve_request(&request.id, RequestStatus::Denied, 2, None)
            .await
            .unwrap());
        assert_eq!(store.injected_failures(), 1);
    }
}
