//! Database schema migrations for SQLite.
//!
//! Versioned: each migration moves the schema from N to N+1 and is recorded
//! in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection, now: i64) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Encrypted vault keys, one row per user. Bundles are CBOR blobs.
        CREATE TABLE vault_keys (
            user_id TEXT PRIMARY KEY,
            auth_method TEXT NOT NULL,
            passphrase_bundle BLOB NOT NULL,
            recovery_bundle BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Last assigned audit seq per user. Survives erasure.
        CREATE TABLE audit_heads (
            user_id TEXT PRIMARY KEY,
            last_seq INTEGER NOT NULL
        );

        CREATE TABLE audit_log (
            user_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            scope TEXT,
            outcome TEXT NOT NULL,
            request_id BLOB,                  -- 16 bytes
            token_id BLOB,                    -- 16 bytes
            detail TEXT,
            PRIMARY KEY (user_id, seq)
        );

        CREATE TABLE consent_requests (
            request_id BLOB PRIMARY KEY,      -- 16 bytes
            user_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            scope TEXT NOT NULL,
            purpose TEXT NOT NULL,
            ttl_ms INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            deadline INTEGER NOT NULL,
            status TEXT NOT NULL,             -- pending | approved | denied | expired
            resolved_at INTEGER,
            token_id BLOB
        );

        CREATE TABLE issued_tokens (
            token_id BLOB PRIMARY KEY,        -- 16 bytes, the jti
            user_id TEXT NOT NULL,
            holder TEXT NOT NULL,
            tier TEXT NOT NULL,
            scope TEXT NOT NULL,
            issued_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            request_id BLOB,
            encoded TEXT NOT NULL
        );

        -- Revocation set. Outlives issued_tokens rows.
        CREATE TABLE revocations (
            token_id BLOB PRIMARY KEY,
            revoked_at INTEGER NOT NULL
        );

        CREATE TABLE trust_links (
            user_id TEXT NOT NULL,
            from_agent TEXT NOT NULL,
            to_agent TEXT NOT NULL,
            scope TEXT NOT NULL,
            token_id BLOB NOT NULL,
            signed_by BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, from_agent, to_agent, scope)
        );

        CREATE INDEX idx_requests_user_status ON consent_requests(user_id, status);
        CREATE INDEX idx_requests_status_deadline ON consent_requests(status, deadline);
        CREATE INDEX idx_requests_resolved ON consent_requests(resolved_at);
        CREATE INDEX idx_issued_user_expiry ON issued_tokens(user_id, expires_at);
        "#,
    )?;

    Ok(())
}
