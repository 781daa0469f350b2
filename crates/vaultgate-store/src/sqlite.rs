//! SQLite implementation of the store traits.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. One connection behind a mutex, so each
//! method body is atomic with respect to the others.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use vaultgate_core::{
    AgentId, AuditAction, AuditEntry, AuditOutcome, AuditRecord, AuthMethod, Clock,
    ConsentRequest, Holder, IssuedToken, KeyBundle, RequestId, RequestStatus, Scope,
    SystemClock, Tier, TokenId, TrustLink, UserId, VaultKeyRecord,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    AuditStore, InsertResult, RequestStore, RevokeResult, TokenStore, TrustStore, VaultStore,
};

/// SQLite-based store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn, SystemClock.now_millis())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn, SystemClock.now_millis())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection in a blocking task.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column helpers
// ─────────────────────────────────────────────────────────────────────────────

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn id_from_blob<T>(bytes: &[u8], column: &str) -> Result<T>
where
    T: for<'a> TryFrom<&'a [u8]>,
{
    T::try_from(bytes).map_err(|_| {
        StoreError::InvalidData(format!(
            "{column}: expected 16 bytes, got {}",
            bytes.len()
        ))
    })
}

fn opt_id_from_blob<T>(bytes: Option<Vec<u8>>, column: &str) -> Result<Option<T>>
where
    T: for<'a> TryFrom<&'a [u8]>,
{
    bytes.map(|b| id_from_blob(&b, column)).transpose()
}

fn parse_user(s: String) -> Result<UserId> {
    UserId::new(s).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn parse_agent(s: String) -> Result<AgentId> {
    AgentId::new(s).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn parse_scope(s: &str) -> Result<Scope> {
    Scope::parse(s).map_err(|e| StoreError::InvalidData(e.to_string()))
}

const AUDIT_COLUMNS: &str =
    "user_id, seq, timestamp, action, actor, scope, outcome, request_id, token_id, detail";

struct AuditRow {
    user_id: String,
    seq: u64,
    timestamp: i64,
    action: String,
    actor: String,
    scope: Option<String>,
    outcome: String,
    request_id: Option<Vec<u8>>,
    token_id: Option<Vec<u8>>,
    detail: Option<String>,
}

impl AuditRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            seq: row.get(1)?,
            timestamp: row.get(2)?,
            action: row.get(3)?,
            actor: row.get(4)?,
            scope: row.get(5)?,
            outcome: row.get(6)?,
            request_id: row.get(7)?,
            token_id: row.get(8)?,
            detail: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<AuditEntry> {
        Ok(AuditEntry {
            seq: self.seq,
            user_id: parse_user(self.user_id)?,
            timestamp: self.timestamp,
            action: AuditAction::parse(&self.action)
                .ok_or_else(|| StoreError::InvalidData(format!("audit action {}", self.action)))?,
            actor: self.actor,
            scope: self.scope,
            outcome: AuditOutcome::from_storage(&self.outcome).ok_or_else(|| {
                StoreError::InvalidData(format!("audit outcome {}", self.outcome))
            })?,
            request_id: opt_id_from_blob(self.request_id, "request_id")?,
            token_id: opt_id_from_blob(self.token_id, "token_id")?,
            detail: self.detail,
        })
    }
}

fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (
            user_id, seq, timestamp, action, actor, scope, outcome, request_id, token_id, detail
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.user_id.as_str(),
            entry.seq,
            entry.timestamp,
            entry.action.as_str(),
            entry.actor,
            entry.scope,
            entry.outcome.to_storage(),
            entry.request_id.map(|id| id.as_bytes().to_vec()),
            entry.token_id.map(|id| id.as_bytes().to_vec()),
            entry.detail,
        ],
    )?;
    Ok(())
}

fn audit_head(conn: &Connection, user: &str) -> Result<u64> {
    Ok(conn
        .query_row(
            "SELECT last_seq FROM audit_heads WHERE user_id = ?1",
            params![user],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0))
}

fn set_audit_head(conn: &Connection, user: &str, seq: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_heads (user_id, last_seq) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET last_seq = excluded.last_seq",
        params![user, seq],
    )?;
    Ok(())
}

const REQUEST_COLUMNS: &str = "request_id, user_id, agent_id, scope, purpose, ttl_ms, \
                               created_at, deadline, status, resolved_at, token_id";

struct RequestRow {
    request_id: Vec<u8>,
    user_id: String,
    agent_id: String,
    scope: String,
    purpose: String,
    ttl_ms: i64,
    created_at: i64,
    deadline: i64,
    status: String,
    resolved_at: Option<i64>,
    token_id: Option<Vec<u8>>,
}

impl RequestRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            request_id: row.get(0)?,
            user_id: row.get(1)?,
            agent_id: row.get(2)?,
            scope: row.get(3)?,
            purpose: row.get(4)?,
            ttl_ms: row.get(5)?,
            created_at: row.get(6)?,
            deadline: row.get(7)?,
            status: row.get(8)?,
            resolved_at: row.get(9)?,
            token_id: row.get(10)?,
        })
    }

    fn into_request(self) -> Result<ConsentRequest> {
        Ok(ConsentRequest {
            id: id_from_blob(&self.request_id, "request_id")?,
            user_id: parse_user(self.user_id)?,
            agent_id: parse_agent(self.agent_id)?,
            scope: parse_scope(&self.scope)?,
            purpose: self.purpose,
            ttl_ms: self.ttl_ms,
            created_at: self.created_at,
            deadline: self.deadline,
            status: RequestStatus::parse(&self.status)
                .ok_or_else(|| StoreError::InvalidData(format!("request status {}", self.status)))?,
            resolved_at: self.resolved_at,
            token_id: opt_id_from_blob(self.token_id, "token_id")?,
        })
    }
}

fn query_requests(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ConsentRequest>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, RequestRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(RequestRow::into_request).collect()
}

const ISSUED_COLUMNS: &str = "t.token_id, t.user_id, t.holder, t.tier, t.scope, t.issued_at, \
                              t.expires_at, t.request_id, t.encoded, r.revoked_at";

struct IssuedRow {
    token_id: Vec<u8>,
    user_id: String,
    holder: String,
    tier: String,
    scope: String,
    issued_at: i64,
    expires_at: i64,
    request_id: Option<Vec<u8>>,
    encoded: String,
    revoked_at: Option<i64>,
}

impl IssuedRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            token_id: row.get(0)?,
            user_id: row.get(1)?,
            holder: row.get(2)?,
            tier: row.get(3)?,
            scope: row.get(4)?,
            issued_at: row.get(5)?,
            expires_at: row.get(6)?,
            request_id: row.get(7)?,
            encoded: row.get(8)?,
            revoked_at: row.get(9)?,
        })
    }

    fn into_issued(self) -> Result<IssuedToken> {
        Ok(IssuedToken {
            token_id: id_from_blob(&self.token_id, "token_id")?,
            user_id: parse_user(self.user_id)?,
            holder: Holder::from_claim(&self.holder)
                .ok_or_else(|| StoreError::InvalidData("empty holder".into()))?,
            tier: Tier::parse(&self.tier)
                .ok_or_else(|| StoreError::InvalidData(format!("tier {}", self.tier)))?,
            scope: parse_scope(&self.scope)?,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            request_id: opt_id_from_blob(self.request_id, "request_id")?,
            encoded: self.encoded,
            revoked_at: self.revoked_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait implementations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append_audit(
        &self,
        user_id: &UserId,
        records: &[AuditRecord],
        at: i64,
    ) -> Result<Vec<AuditEntry>> {
        let user_id = user_id.clone();
        let records = records.to_vec();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut seq = audit_head(&tx, user_id.as_str())?;

            let mut appended = Vec::with_capacity(records.len());
            for record in records {
                seq += 1;
                let entry = record.into_entry(user_id.clone(), seq, at);
                insert_audit_entry(&tx, &entry)?;
                appended.push(entry);
            }

            set_audit_head(&tx, user_id.as_str(), seq)?;
            tx.commit()?;
            Ok(appended)
        })
        .await
    }

    async fn list_audit(&self, user_id: &UserId, since: Option<u64>) -> Result<Vec<AuditEntry>> {
        let user_id = user_id.clone();
        let since = since.unwrap_or(0);

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_log
                 WHERE user_id = ?1 AND seq > ?2 ORDER BY seq"
            ))?;
            let rows = stmt
                .query_map(params![user_id.as_str(), since], AuditRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(AuditRow::into_entry).collect()
        })
        .await
    }

    async fn erase_audit(
        &self,
        user_id: &UserId,
        tombstone: &AuditRecord,
        at: i64,
    ) -> Result<AuditEntry> {
        let user_id = user_id.clone();
        let tombstone = tombstone.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let seq = audit_head(&tx, user_id.as_str())? + 1;

            tx.execute(
                "DELETE FROM audit_log WHERE user_id = ?1",
                params![user_id.as_str()],
            )?;
            let entry = tombstone.into_entry(user_id.clone(), seq, at);
            insert_audit_entry(&tx, &entry)?;
            set_audit_head(&tx, user_id.as_str(), seq)?;

            tx.commit()?;
            Ok(entry)
        })
        .await
    }
}

#[async_trait]
impl VaultStore for SqliteStore {
    async fn insert_vault_key(&self, record: &VaultKeyRecord) -> Result<InsertResult> {
        let record = record.clone();
        let passphrase = to_cbor(&record.passphrase_bundle)?;
        let recovery = to_cbor(&record.recovery_bundle)?;

        self.run(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO vault_keys (
                    user_id, auth_method, passphrase_bundle, recovery_bundle, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.user_id.as_str(),
                    record.auth_method.as_str(),
                    passphrase,
                    recovery,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(if changed == 1 {
                InsertResult::Inserted
            } else {
                InsertResult::AlreadyExists
            })
        })
        .await
    }

    async fn get_vault_key(&self, user_id: &UserId) -> Result<Option<VaultKeyRecord>> {
        let user_id = user_id.clone();

        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT auth_method, passphrase_bundle, recovery_bundle, created_at, updated_at
                     FROM vault_keys WHERE user_id = ?1",
                    params![user_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((auth_method, passphrase, recovery, created_at, updated_at)) = row else {
                return Ok(None);
            };

            Ok(Some(VaultKeyRecord {
                auth_method: AuthMethod::parse(&auth_method).ok_or_else(|| {
                    StoreError::InvalidData(format!("auth method {auth_method}"))
                })?,
                passphrase_bundle: from_cbor::<KeyBundle>(&passphrase)?,
                recovery_bundle: from_cbor::<KeyBundle>(&recovery)?,
                user_id,
                created_at,
                updated_at,
            }))
        })
        .await
    }

    async fn replace_vault_key(&self, record: &VaultKeyRecord) -> Result<()> {
        let record = record.clone();
        let passphrase = to_cbor(&record.passphrase_bundle)?;
        let recovery = to_cbor(&record.recovery_bundle)?;

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE vault_keys
                 SET auth_method = ?2, passphrase_bundle = ?3, recovery_bundle = ?4, updated_at = ?5
                 WHERE user_id = ?1",
                params![
                    record.user_id.as_str(),
                    record.auth_method.as_str(),
                    passphrase,
                    recovery,
                    record.updated_at,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "vault key for {}",
                    record.user_id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_vault_key(&self, user_id: &UserId) -> Result<bool> {
        let user_id = user_id.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "DELETE FROM vault_keys WHERE user_id = ?1",
                params![user_id.as_str()],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn insert_request(&self, request: &ConsentRequest) -> Result<()> {
        let request = request.clone();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO consent_requests ({REQUEST_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    request.id.as_bytes().as_slice(),
                    request.user_id.as_str(),
                    request.agent_id.as_str(),
                    request.scope.to_string(),
                    request.purpose,
                    request.ttl_ms,
                    request.created_at,
                    request.deadline,
                    request.status.as_str(),
                    request.resolved_at,
                    request.token_id.map(|id| id.as_bytes().to_vec()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<ConsentRequest>> {
        let id = *id;
        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {REQUEST_COLUMNS} FROM consent_requests WHERE request_id = ?1"),
                    params![id.as_bytes().as_slice()],
                    RequestRow::read,
                )
                .optional()?;
            row.map(RequestRow::into_request).transpose()
        })
        .await
    }

    async fn resolve_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        resolved_at: i64,
        token_id: Option<TokenId>,
    ) -> Result<bool> {
        let id = *id;
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE consent_requests
                 SET status = ?2, resolved_at = ?3, token_id = ?4
                 WHERE request_id = ?1 AND status = 'pending'",
                params![
                    id.as_bytes().as_slice(),
                    status.as_str(),
                    resolved_at,
                    token_id.map(|t| t.as_bytes().to_vec()),
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn list_requests(
        &self,
        user_id: &UserId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ConsentRequest>> {
        let user_id = user_id.clone();
        self.run(move |conn| match status {
            Some(status) => query_requests(
                conn,
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM consent_requests
                     WHERE user_id = ?1 AND status = ?2 ORDER BY created_at, request_id"
                ),
                params![user_id.as_str(), status.as_str()],
            ),
            None => query_requests(
                conn,
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM consent_requests
                     WHERE user_id = ?1 ORDER BY created_at, request_id"
                ),
                params![user_id.as_str()],
            ),
        })
        .await
    }

    async fn list_overdue(&self, now: i64) -> Result<Vec<ConsentRequest>> {
        self.run(move |conn| {
            query_requests(
                conn,
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM consent_requests
                     WHERE status = 'pending' AND deadline <= ?1 ORDER BY deadline, request_id"
                ),
                params![now],
            )
        })
        .await
    }

    async fn purge_resolved_before(&self, cutoff: i64) -> Result<usize> {
        self.run(move |conn| {
            Ok(conn.execute(
                "DELETE FROM consent_requests
                 WHERE resolved_at IS NOT NULL AND resolved_at < ?1",
                params![cutoff],
            )?)
        })
        .await
    }

    async fn delete_requests_for(&self, user_id: &UserId) -> Result<usize> {
        let user_id = user_id.clone();
        self.run(move |conn| {
            Ok(conn.execute(
                "DELETE FROM consent_requests WHERE user_id = ?1",
                params![user_id.as_str()],
            )?)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn record_issued(&self, token: &IssuedToken) -> Result<()> {
        let token = token.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO issued_tokens (
                    token_id, user_id, holder, tier, scope, issued_at, expires_at, request_id, encoded
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    token.token_id.as_bytes().as_slice(),
                    token.user_id.as_str(),
                    token.holder.as_claim(),
                    token.tier.as_str(),
                    token.scope.to_string(),
                    token.issued_at,
                    token.expires_at,
                    token.request_id.map(|id| id.as_bytes().to_vec()),
                    token.encoded,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_issued(&self, id: &TokenId) -> Result<Option<IssuedToken>> {
        let id = *id;
        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {ISSUED_COLUMNS} FROM issued_tokens t
                         LEFT JOIN revocations r ON r.token_id = t.token_id
                         WHERE t.token_id = ?1"
                    ),
                    params![id.as_bytes().as_slice()],
                    IssuedRow::read,
                )
                .optional()?;
            row.map(IssuedRow::into_issued).transpose()
        })
        .await
    }

    async fn live_tokens_for(&self, user_id: &UserId, now: i64) -> Result<Vec<IssuedToken>> {
        let user_id = user_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ISSUED_COLUMNS} FROM issued_tokens t
                 LEFT JOIN revocations r ON r.token_id = t.token_id
                 WHERE t.user_id = ?1 AND t.expires_at > ?2 AND r.token_id IS NULL
                 ORDER BY t.issued_at, t.token_id"
            ))?;
            let rows = stmt
                .query_map(params![user_id.as_str(), now], IssuedRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(IssuedRow::into_issued).collect()
        })
        .await
    }

    async fn revoke(&self, id: &TokenId, at: i64) -> Result<RevokeResult> {
        let id = *id;
        self.run(move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT revoked_at FROM revocations WHERE token_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(revoked_at) = existing {
                return Ok(RevokeResult::AlreadyRevoked { revoked_at });
            }

            conn.execute(
                "INSERT INTO revocations (token_id, revoked_at) VALUES (?1, ?2)",
                params![id.as_bytes().as_slice(), at],
            )?;
            Ok(RevokeResult::Revoked)
        })
        .await
    }

    async fn revoked_at(&self, id: &TokenId) -> Result<Option<i64>> {
        let id = *id;
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT revoked_at FROM revocations WHERE token_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn erase_tokens_for(&self, user_id: &UserId, at: i64) -> Result<usize> {
        let user_id = user_id.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO revocations (token_id, revoked_at)
                 SELECT token_id, ?2 FROM issued_tokens WHERE user_id = ?1",
                params![user_id.as_str(), at],
            )?;
            let removed = tx.execute(
                "DELETE FROM issued_tokens WHERE user_id = ?1",
                params![user_id.as_str()],
            )?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}

#[async_trait]
impl TrustStore for SqliteStore {
    async fn put_trust_link(&self, link: &TrustLink) -> Result<()> {
        let link = link.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO trust_links (
                    user_id, from_agent, to_agent, scope, token_id, signed_by, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    link.user_id.as_str(),
                    link.from_agent.as_str(),
                    link.to_agent.as_str(),
                    link.scope.to_string(),
                    link.token_id.as_bytes().as_slice(),
                    link.signed_by.as_bytes().as_slice(),
                    link.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_trust_links(&self, user_id: &UserId) -> Result<Vec<TrustLink>> {
        let user_id = user_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT from_agent, to_agent, scope, token_id, signed_by, created_at
                 FROM trust_links WHERE user_id = ?1
                 ORDER BY from_agent, to_agent, scope",
            )?;
            let rows = stmt
                .query_map(params![user_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(from, to, scope_str, token_id, signed_by, created_at)| {
                    Ok(TrustLink {
                        from_agent: parse_agent(from)?,
                        to_agent: parse_agent(to)?,
                        scope: parse_scope(&scope_str)?,
                        user_id: user_id.clone(),
                        token_id: id_from_blob(&token_id, "token_id")?,
                        signed_by: id_from_blob(&signed_by, "signed_by")?,
                        created_at,
                    })
                })
                .collect()
        })
        .await
    }

    async fn delete_trust_links_for(&self, user_id: &UserId) -> Result<usize> {
        let user_id = user_id.clone();
        self.run(move |conn| {
            Ok(conn.execute(
                "DELETE FROM trust_links WHERE user_id = ?1",
                params![user_id.as_str()],
            )?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[tokio::test]
    async fn test_audit_sequencing() {
        conformance::audit_sequencing(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_audit_erasure() {
        conformance::audit_erasure(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_vault_keys() {
        conformance::vault_keys(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_requests() {
        conformance::requests(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_tokens_and_revocation() {
        conformance::tokens_and_revocation(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_trust_links() {
        conformance::trust_links(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vaultgate.db");
        let user = UserId::new("u1").unwrap();

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append_audit(
                    &user,
                    &[AuditRecord::new(AuditAction::Requested, "a1")],
                    1_000,
                )
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let entries = store.list_audit(&user, None).await.unwrap();
        assert_eq!(entries.len(), 1);

        let next = store
            .append_audit(&user, &[AuditRecord::new(AuditAction::Denied, "session")], 2_000)
            .await
            .unwrap();
        assert_eq!(next[0].seq, 2);
    }
}
