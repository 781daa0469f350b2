//! In-memory implementation of the store traits.
//!
//! Primarily for testing. Same semantics as SQLite, no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use vaultgate_core::{
    AuditEntry, AuditRecord, ConsentRequest, IssuedToken, RequestId, RequestStatus, TokenId,
    TrustLink, UserId, VaultKeyRecord,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    AuditStore, InsertResult, RequestStore, RevokeResult, TokenStore, TrustStore, VaultStore,
};

/// In-memory store. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Per-user audit head (last assigned seq) and entries.
    audit: HashMap<UserId, UserAudit>,

    vault_keys: HashMap<UserId, VaultKeyRecord>,

    requests: HashMap<RequestId, ConsentRequest>,

    issued: HashMap<TokenId, IssuedToken>,

    /// Revocation set: token id -> revoked_at.
    revocations: HashMap<TokenId, i64>,

    /// (user, from, to, scope) -> link.
    trust_links: BTreeMap<(UserId, String, String, String), TrustLink>,
}

#[derive(Default)]
struct UserAudit {
    head: u64,
    entries: Vec<AuditEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn trust_key(link: &TrustLink) -> (UserId, String, String, String) {
    (
        link.user_id.clone(),
        link.from_agent.to_string(),
        link.to_agent.to_string(),
        link.scope.to_string(),
    )
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(
        &self,
        user_id: &UserId,
        records: &[AuditRecord],
        at: i64,
    ) -> Result<Vec<AuditEntry>> {
        let mut inner = self.write()?;
        let log = inner.audit.entry(user_id.clone()).or_default();

        let mut appended = Vec::with_capacity(records.len());
        for record in records {
            log.head += 1;
            let entry = record.clone().into_entry(user_id.clone(), log.head, at);
            log.entries.push(entry.clone());
            appended.push(entry);
        }
        Ok(appended)
    }

    async fn list_audit(&self, user_id: &UserId, since: Option<u64>) -> Result<Vec<AuditEntry>> {
        let inner = self.read()?;
        let since = since.unwrap_or(0);
        Ok(inner
            .audit
            .get(user_id)
            .map(|log| {
                log.entries
                    .iter()
                    .filter(|e| e.seq > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn erase_audit(
        &self,
        user_id: &UserId,
        tombstone: &AuditRecord,
        at: i64,
    ) -> Result<AuditEntry> {
        let mut inner = self.write()?;
        let log = inner.audit.entry(user_id.clone()).or_default();

        log.entries.clear();
        log.head += 1;
        let entry = tombstone.clone().into_entry(user_id.clone(), log.head, at);
        log.entries.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn insert_vault_key(&self, record: &VaultKeyRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;
        if inner.vault_keys.contains_key(&record.user_id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner
            .vault_keys
            .insert(record.user_id.clone(), record.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_vault_key(&self, user_id: &UserId) -> Result<Option<VaultKeyRecord>> {
        Ok(self.read()?.vault_keys.get(user_id).cloned())
    }

    async fn replace_vault_key(&self, record: &VaultKeyRecord) -> Result<()> {
        let mut inner = self.write()?;
        match inner.vault_keys.get_mut(&record.user_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "vault key for {}",
                record.user_id
            ))),
        }
    }

    async fn delete_vault_key(&self, user_id: &UserId) -> Result<bool> {
        Ok(self.write()?.vault_keys.remove(user_id).is_some())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(&self, request: &ConsentRequest) -> Result<()> {
        self.write()?.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<ConsentRequest>> {
        Ok(self.read()?.requests.get(id).cloned())
    }

    async fn resolve_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        resolved_at: i64,
        token_id: Option<TokenId>,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.requests.get_mut(id) {
            Some(request) if request.is_pending() => {
                request.status = status;
                request.resolved_at = Some(resolved_at);
                request.token_id = token_id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_requests(
        &self,
        user_id: &UserId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ConsentRequest>> {
        let inner = self.read()?;
        let mut requests: Vec<ConsentRequest> = inner
            .requests
            .values()
            .filter(|r| &r.user_id == user_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    async fn list_overdue(&self, now: i64) -> Result<Vec<ConsentRequest>> {
        let inner = self.read()?;
        let mut requests: Vec<ConsentRequest> = inner
            .requests
            .values()
            .filter(|r| r.is_pending() && r.is_past_deadline(now))
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.deadline, r.id));
        Ok(requests)
    }

    async fn purge_resolved_before(&self, cutoff: i64) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.requests.len();
        inner
            .requests
            .retain(|_, r| !matches!(r.resolved_at, Some(at) if at < cutoff));
        Ok(before - inner.requests.len())
    }

    async fn delete_requests_for(&self, user_id: &UserId) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.requests.len();
        inner.requests.retain(|_, r| &r.user_id != user_id);
        Ok(before - inner.requests.len())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn record_issued(&self, token: &IssuedToken) -> Result<()> {
        self.write()?.issued.insert(token.token_id, token.clone());
        Ok(())
    }

    async fn get_issued(&self, id: &TokenId) -> Result<Option<IssuedToken>> {
        let inner = self.read()?;
        Ok(inner.issued.get(id).map(|t| IssuedToken {
            revoked_at: inner.revocations.get(id).copied(),
            ..t.clone()
        }))
    }

    async fn live_tokens_for(&self, user_id: &UserId, now: i64) -> Result<Vec<IssuedToken>> {
        let inner = self.read()?;
        let mut tokens: Vec<IssuedToken> = inner
            .issued
            .values()
            .filter(|t| &t.user_id == user_id)
            .filter(|t| !inner.revocations.contains_key(&t.token_id))
            .filter(|t| t.expires_at > now)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| (t.issued_at, t.token_id));
        Ok(tokens)
    }

    async fn revoke(&self, id: &TokenId, at: i64) -> Result<RevokeResult> {
        let mut inner = self.write()?;
        if let Some(&revoked_at) = inner.revocations.get(id) {
            return Ok(RevokeResult::AlreadyRevoked { revoked_at });
        }
        inner.revocations.insert(*id, at);
        Ok(RevokeResult::Revoked)
    }

    async fn revoked_at(&self, id: &TokenId) -> Result<Option<i64>> {
        Ok(self.read()?.revocations.get(id).copied())
    }

    async fn erase_tokens_for(&self, user_id: &UserId, at: i64) -> Result<usize> {
        let mut inner = self.write()?;
        let ids: Vec<TokenId> = inner
            .issued
            .values()
            .filter(|t| &t.user_id == user_id)
            .map(|t| t.token_id)
            .collect();
        for id in &ids {
            inner.revocations.entry(*id).or_insert(at);
            inner.issued.remove(id);
        }
        Ok(ids.len())
    }
}

#[async_trait]
impl TrustStore for MemoryStore {
    async fn put_trust_link(&self, link: &TrustLink) -> Result<()> {
        self.write()?.trust_links.insert(trust_key(link), link.clone());
        Ok(())
    }

    async fn list_trust_links(&self, user_id: &UserId) -> Result<Vec<TrustLink>> {
        let inner = self.read()?;
        Ok(inner
            .trust_links
            .values()
            .filter(|l| &l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_trust_links_for(&self, user_id: &UserId) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.trust_links.len();
        inner.trust_links.retain(|(user, ..), _| user != user_id);
        Ok(before - inner.trust_links.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[tokio::test]
    async fn test_audit_sequencing() {
        conformance::audit_sequencing(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_audit_erasure() {
        conformance::audit_erasure(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_vault_keys() {
        conformance::vault_keys(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_requests() {
        conformance::requests(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_tokens_and_revocation() {
        conformance::tokens_and_revocation(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_trust_links() {
        conformance::trust_links(&MemoryStore::new()).await;
    }
}
