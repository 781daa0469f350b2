//! Storage traits.
//!
//! Each entity family has its own trait so services can depend on exactly
//! what they use (the audit log only needs [`AuditStore`]). [`Store`] is the
//! umbrella implemented by every full backend.

use async_trait::async_trait;

use vaultgate_core::{
    AuditEntry, AuditRecord, ConsentRequest, IssuedToken, RequestId, RequestStatus, TokenId,
    TrustLink, UserId, VaultKeyRecord,
};

use crate::error::Result;

/// Result of inserting a keyed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    /// A record with the same key is already present. Nothing was written.
    AlreadyExists,
}

/// Result of adding a token to the revocation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeResult {
    Revoked,
    /// Already in the set; the original revocation time is kept.
    AlreadyRevoked { revoked_at: i64 },
}

/// Append-only, per-user sequenced audit storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append `records` for `user_id` as one atomic batch.
    ///
    /// Entries receive consecutive sequence numbers following the user's
    /// current head, in slice order. Either all are written or none.
    async fn append_audit(
        &self,
        user_id: &UserId,
        records: &[AuditRecord],
        at: i64,
    ) -> Result<Vec<AuditEntry>>;

    /// Entries with `seq > since`, ascending.
    async fn list_audit(&self, user_id: &UserId, since: Option<u64>) -> Result<Vec<AuditEntry>>;

    /// Delete every entry for the user and append `tombstone` with the next
    /// sequence number, atomically.
    async fn erase_audit(
        &self,
        user_id: &UserId,
        tombstone: &AuditRecord,
        at: i64,
    ) -> Result<AuditEntry>;
}

/// Encrypted vault-key records. Never holds plaintext keys.
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn insert_vault_key(&self, record: &VaultKeyRecord) -> Result<InsertResult>;

    async fn get_vault_key(&self, user_id: &UserId) -> Result<Option<VaultKeyRecord>>;

    /// Replace the whole record. Fails with `NotFound` if there is none.
    async fn replace_vault_key(&self, record: &VaultKeyRecord) -> Result<()>;

    async fn delete_vault_key(&self, user_id: &UserId) -> Result<bool>;
}

/// Consent requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(&self, request: &ConsentRequest) -> Result<()>;

    async fn get_request(&self, id: &RequestId) -> Result<Option<ConsentRequest>>;

    /// Move a request out of `Pending`.
    ///
    /// Returns `false` without writing if the request is missing or already
    /// terminal, so the first terminal write wins.
    async fn resolve_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        resolved_at: i64,
        token_id: Option<TokenId>,
    ) -> Result<bool>;

    /// The user's requests, optionally filtered by status, oldest first.
    async fn list_requests(
        &self,
        user_id: &UserId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ConsentRequest>>;

    /// Pending requests of any user with `deadline <= now`.
    async fn list_overdue(&self, now: i64) -> Result<Vec<ConsentRequest>>;

    /// Drop terminal requests resolved before `cutoff`. Returns the count.
    async fn purge_resolved_before(&self, cutoff: i64) -> Result<usize>;

    async fn delete_requests_for(&self, user_id: &UserId) -> Result<usize>;
}

/// Issued-token index and revocation set.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn record_issued(&self, token: &IssuedToken) -> Result<()>;

    /// The issued record, with `revoked_at` filled from the revocation set.
    async fn get_issued(&self, id: &TokenId) -> Result<Option<IssuedToken>>;

    /// Unrevoked tokens for the user with `expires_at > now`.
    async fn live_tokens_for(&self, user_id: &UserId, now: i64) -> Result<Vec<IssuedToken>>;

    async fn revoke(&self, id: &TokenId, at: i64) -> Result<RevokeResult>;

    async fn revoked_at(&self, id: &TokenId) -> Result<Option<i64>>;

    /// Revoke every token issued to the user and drop their issued records.
    /// Revocation entries are kept so copies of the tokens stay dead.
    async fn erase_tokens_for(&self, user_id: &UserId, at: i64) -> Result<usize>;
}

/// Agent-to-agent delegations.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Insert or replace the link for `(user, from, to, scope)`.
    async fn put_trust_link(&self, link: &TrustLink) -> Result<()>;

    async fn list_trust_links(&self, user_id: &UserId) -> Result<Vec<TrustLink>>;

    async fn delete_trust_links_for(&self, user_id: &UserId) -> Result<usize>;
}

/// A complete backend.
pub trait Store: AuditStore + VaultStore + RequestStore + TokenStore + TrustStore {}

impl<T> Store for T where T: AuditStore + VaultStore + RequestStore + TokenStore + TrustStore {}
