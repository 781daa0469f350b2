//! The audit log service.
//!
//! Wraps an [`AuditStore`] with bounded retries. Writes that gate a state
//! transition go through [`AuditLog::append`] / [`AuditLog::append_batch`]
//! and fail closed with `AuditWriteFailed`. Informational notes (cache hits,
//! rejected tokens, late no-op writers) use [`AuditLog::note`], which logs
//! and moves on.

use std::future::Future;
use std::sync::Arc;

use vaultgate_core::{AuditEntry, AuditRecord, UserId};
use vaultgate_store::{AuditStore, StoreError};

use crate::config::AuditConfig;
use crate::error::{GateError, Result};

pub struct AuditLog<S: ?Sized> {
    store: Arc<S>,
    config: AuditConfig,
}

impl<S: AuditStore + ?Sized> AuditLog<S> {
    pub fn new(store: Arc<S>, config: AuditConfig) -> Self {
        Self { store, config }
    }

    /// Append one record. Returns its sequence number.
    pub async fn append(&self, user_id: &UserId, record: AuditRecord, at: i64) -> Result<u64> {
        let entries = self.append_batch(user_id, &[record], at).await?;
        entries
            .first()
            .map(|entry| entry.seq)
            .ok_or_else(|| GateError::AuditWriteFailed {
                attempts: 1,
                reason: "store returned no entry".into(),
            })
    }

    /// Append records atomically, in order, with consecutive sequence numbers.
    pub async fn append_batch(
        &self,
        user_id: &UserId,
        records: &[AuditRecord],
        at: i64,
    ) -> Result<Vec<AuditEntry>> {
        self.with_retry(user_id, move || self.store.append_audit(user_id, records, at))
            .await
    }

    /// Best-effort append. Failures are logged, never returned.
    pub async fn note(&self, user_id: &UserId, record: AuditRecord, at: i64) {
        let action = record.action;
        if let Err(e) = self.append_batch(user_id, &[record], at).await {
            tracing::warn!(user = %user_id, %action, error = %e, "dropped audit note");
        }
    }

    /// The user's entries with `seq > since`, in order.
    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        since: Option<u64>,
    ) -> Result<Vec<AuditEntry>> {
        Ok(self.store.list_audit(user_id, since).await?)
    }

    /// Replace the user's whole log with `tombstone`.
    pub async fn erase(
        &self,
        user_id: &UserId,
        tombstone: &AuditRecord,
        at: i64,
    ) -> Result<AuditEntry> {
        self.with_retry(user_id, move || self.store.erase_audit(user_id, tombstone, at))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, user_id: &UserId, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let attempts = self.config.attempts();
        let mut backoff = self.config.retry_backoff;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(user = %user_id, attempt, attempts, error = %e, "audit write failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        Err(GateError::AuditWriteFailed {
            attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into()),
        })
    }
}
