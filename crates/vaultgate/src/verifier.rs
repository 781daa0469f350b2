//! Stateful token verification.
//!
//! [`TokenCodec`] answers the stateless questions (well-formed, signed,
//! unexpired, in scope). This adds the revocation set and reports every
//! rejection to the audit log.

use std::sync::Arc;

use vaultgate_core::{
    AuditAction, AuditOutcome, AuditRecord, Clock, Operation, RequiredScope, Token, TokenCodec,
    UserId, Verification,
};
use vaultgate_store::{AuditStore, TokenStore};

use crate::audit::AuditLog;
use crate::error::{GateError, Result};

pub struct TokenVerifier<S: ?Sized> {
    codec: Arc<TokenCodec>,
    store: Arc<S>,
    audit: Arc<AuditLog<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: AuditStore + TokenStore + ?Sized> TokenVerifier<S> {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<S>,
        audit: Arc<AuditLog<S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            store,
            audit,
            clock,
        }
    }

    /// Verify `encoded`, optionally against a required scope.
    ///
    /// Checks run in order: well-formedness, signature, expiry, revocation,
    /// scope. The first failure wins and is audited. `Err` is returned only
    /// when the revocation set cannot be read, in which case nothing is
    /// accepted.
    pub async fn verify(
        &self,
        encoded: &str,
        expected: Option<&RequiredScope>,
    ) -> Result<Verification> {
        let now = self.clock.now_millis();

        let verification = match self.codec.authenticate(encoded, now) {
            Verification::Valid(token) => match self.store.revoked_at(&token.id).await? {
                Some(revoked_at) => Verification::Revoked { token, revoked_at },
                None => match expected {
                    Some(required) if !token.covers(required) => Verification::ScopeMismatch {
                        token,
                        required: required.clone(),
                    },
                    _ => Verification::Valid(token),
                },
            },
            other => other,
        };

        if !verification.is_valid() {
            self.report(&verification, expected, now).await;
        }
        Ok(verification)
    }

    /// Verify `encoded` and check its tier permits `op`.
    pub async fn authorize(&self, encoded: &str, op: &Operation) -> Result<Token> {
        let required = match op {
            Operation::ReadData(scope) | Operation::WriteData(scope) => Some(scope),
            Operation::ConfirmIdentity | Operation::ReadVaultKey => None,
        };

        let token = self.verify(encoded, required).await?.into_result()?;
        if !token.permits(op) {
            self.reject(&token, "not_authorized").await;
            return Err(GateError::NotAuthorized(format!(
                "{} token cannot {}",
                token.tier,
                operation_name(op)
            )));
        }
        Ok(token)
    }

    /// Authorize `encoded` as proof of being `user_id`.
    pub async fn confirm_identity(&self, encoded: &str, user_id: &UserId) -> Result<Token> {
        let token = self.authorize(encoded, &Operation::ConfirmIdentity).await?;
        ensure_subject(&token, user_id)?;
        Ok(token)
    }

    /// Authorize `encoded` as the unlocked owner of `user_id`'s vault.
    pub async fn confirm_owner(&self, encoded: &str, user_id: &UserId) -> Result<Token> {
        let token = self.authorize(encoded, &Operation::ReadVaultKey).await?;
        ensure_subject(&token, user_id)?;
        Ok(token)
    }

    async fn report(
        &self,
        verification: &Verification,
        expected: Option<&RequiredScope>,
        now: i64,
    ) {
        let Some(error) = verification.error() else {
            return;
        };

        // A token that failed its signature check names an untrusted subject.
        let (user_id, mut record) = match verification.token() {
            Some(token) => (
                token.subject.clone(),
                AuditRecord::new(AuditAction::ValidationFailed, token.holder.as_claim())
                    .with_token(token.id),
            ),
            None => (
                UserId::unknown(),
                AuditRecord::new(AuditAction::ValidationFailed, UserId::UNKNOWN),
            ),
        };
        record = record.with_outcome(AuditOutcome::Failure(error.kind().to_string()));
        if let Some(required) = expected {
            record = record.with_scope(required);
        }

        tracing::debug!(user = %user_id, kind = error.kind(), "token rejected");
        self.audit.note(&user_id, record, now).await;
    }

    async fn reject(&self, token: &Token, kind: &str) {
        let record = AuditRecord::new(AuditAction::ValidationFailed, token.holder.as_claim())
            .with_token(token.id)
            .with_scope(&token.scope)
            .with_outcome(AuditOutcome::Failure(kind.to_string()));
        self.audit
            .note(&token.subject, record, self.clock.now_millis())
            .await;
    }
}

fn ensure_subject(token: &Token, user_id: &UserId) -> Result<()> {
    if &token.subject != user_id {
        return Err(GateError::NotAuthorized(format!(
            "token subject is not {user_id}"
        )));
    }
    Ok(())
}

fn operation_name(op: &Operation) -> &'static str {
    match op {
        Operation::ReadData(_) => "read data",
        Operation::WriteData(_) => "write data",
        Operation::ConfirmIdentity => "confirm identity",
        Operation::ReadVaultKey => "read the vault key",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use std::time::Duration;
    use vaultgate_core::codec::encode;
    use vaultgate_core::{AgentId, Holder, Keypair, ManualClock, Tier, ValidationError};
    use vaultgate_store::MemoryStore;

    struct Fixture {
        codec: Arc<TokenCodec>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        verifier: TokenVerifier<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let codec = Arc::new(TokenCodec::new("vaultgate", Keypair::from_seed(&[7; 32])));
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let audit = Arc::new(AuditLog::new(store.clone(), AuditConfig::default()));
        let verifier = TokenVerifier::new(codec.clone(), store.clone(), audit, clock.clone());
        Fixture {
            codec,
            store,
            clock,
            verifier,
        }
    }

    fn u1() -> UserId {
        UserId::new("u1").unwrap()
    }

    fn mint(f: &Fixture, tier: Tier, scope: &str) -> (Token, String) {
        let holder = Holder::Agent(AgentId::new("a1").unwrap());
        let token = f
            .codec
            .mint(&u1(), holder, tier, scope, Duration::from_secs(60), 1_000)
            .unwrap();
        let encoded = encode(&token).unwrap();
        (token, encoded)
    }

    fn req(s: &str) -> RequiredScope {
        RequiredScope::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_is_not_audited() {
        let f = fixture();
        let (_, encoded) = mint(&f, Tier::Consent, "attr.food.*");
        let v = f
            .verifier
            .verify(&encoded, Some(&req("attr.food.diet")))
            .await
            .unwrap();
        assert!(v.is_valid());
        assert!(f.store.list_audit(&u1(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoked_beats_scope_mismatch() {
        let f = fixture();
        let (token, encoded) = mint(&f, Tier::Consent, "attr.food.*");
        f.store.revoke(&token.id, 1_500).await.unwrap();

        let v = f
            .verifier
            .verify(&encoded, Some(&req("attr.finance.budget")))
            .await
            .unwrap();
        assert_eq!(
            v.error(),
            Some(ValidationError::Revoked { revoked_at: 1_500 })
        );

        let log = f.store.list_audit(&u1(), None).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, AuditAction::ValidationFailed);
        assert_eq!(log[0].outcome, AuditOutcome::Failure("revoked".into()));
        assert_eq!(log[0].token_id, Some(token.id));
    }

    #[tokio::test]
    async fn test_expired_beats_revoked() {
        let f = fixture();
        let (token, encoded) = mint(&f, Tier::Consent, "attr.food.*");
        f.store.revoke(&token.id, 1_500).await.unwrap();
        f.clock.advance(Duration::from_secs(60));

        let v = f.verifier.verify(&encoded, None).await.unwrap();
        assert!(matches!(v, Verification::Expired(_)));
    }

    #[tokio::test]
    async fn test_garbage_is_audited_under_unknown() {
        let f = fixture();
        let v = f.verifier.verify("vg1:not-a-token", None).await.unwrap();
        assert!(matches!(v, Verification::Malformed(_)));

        let log = f.store.list_audit(&UserId::unknown(), None).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, AuditOutcome::Failure("malformed".into()));
    }

    #[tokio::test]
    async fn test_foreign_signature_is_audited_under_unknown() {
        let f = fixture();
        let other = TokenCodec::new("vaultgate", Keypair::from_seed(&[8; 32]));
        let forged = other
            .mint(
                &u1(),
                Holder::Session,
                Tier::VaultOwner,
                "vault.owner",
                Duration::from_secs(60),
                1_000,
            )
            .unwrap();

        let v = f
            .verifier
            .verify(&encode(&forged).unwrap(), None)
            .await
            .unwrap();
        assert_eq!(v, Verification::SignatureMismatch);
        assert!(f.store.list_audit(&u1(), None).await.unwrap().is_empty());
        assert_eq!(
            f.store.list_audit(&UserId::unknown(), None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_session_cannot_read_vault_key() {
        let f = fixture();
        let token = f
            .codec
            .mint(&u1(), Holder::Session, Tier::Session, "session", Duration::from_secs(60), 1_000)
            .unwrap();
        let encoded = encode(&token).unwrap();

        let err = f
            .verifier
            .authorize(&encoded, &Operation::ReadVaultKey)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NotAuthorized(_)));
        assert!(f.verifier.confirm_identity(&encoded, &u1()).await.is_ok());
    }

    #[tokio::test]
    async fn test_consent_token_is_not_an_identity() {
        let f = fixture();
        let (_, encoded) = mint(&f, Tier::Consent, "attr.food.*");
        let err = f
            .verifier
            .confirm_identity(&encoded, &u1())
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_identity_must_match_subject() {
        let f = fixture();
        let token = f
            .codec
            .mint(
                &u1(),
                Holder::Session,
                Tier::VaultOwner,
                "vault.owner",
                Duration::from_secs(60),
                1_000,
            )
            .unwrap();
        let encoded = encode(&token).unwrap();
        let u2 = UserId::new("u2").unwrap();
        assert!(f.verifier.confirm_owner(&encoded, &u1()).await.is_ok());
        assert!(matches!(
            f.verifier.confirm_owner(&encoded, &u2).await,
            Err(GateError::NotAuthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_data_read_checks_scope() {
        let f = fixture();
        let (_, encoded) = mint(&f, Tier::Consent, "attr.food.*");
        let err = f
            .verifier
            .authorize(&encoded, &Operation::ReadData(req("attr.finance.budget")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ScopeMismatch);
    }
}
