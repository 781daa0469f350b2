//! Behaviour shared by every backend, run against each one from its own
//! test module.

use std::time::Duration;

use vaultgate_core::{
    AgentContext, AgentId, AuditAction, AuditOutcome, AuditRecord, AuthMethod, ConsentRequest,
    Holder, IssuedToken, KdfParams, KeyBundle, RequestStatus, Scope, Tier, TokenId, TrustLink,
    UserId, VaultKeyRecord,
};

use crate::traits::{InsertResult, RevokeResult, Store};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn agent(id: &str) -> AgentId {
    AgentId::new(id).unwrap()
}

fn request(user_id: &str, scope: &str, now: i64) -> ConsentRequest {
    ConsentRequest::new(
        &AgentContext::new(user(user_id), agent("a1")),
        Scope::parse(scope).unwrap(),
        "testing",
        Duration::from_secs(60),
        now,
        Duration::from_secs(30),
    )
}

fn issued(user_id: &str, scope: &str, expires_at: i64) -> IssuedToken {
    IssuedToken {
        token_id: TokenId::generate(),
        user_id: user(user_id),
        holder: Holder::Agent(agent("a1")),
        tier: Tier::Consent,
        scope: Scope::parse(scope).unwrap(),
        issued_at: 0,
        expires_at,
        request_id: None,
        encoded: "vg1:x.y".into(),
        revoked_at: None,
    }
}

fn bundle(fill: u8) -> KeyBundle {
    KeyBundle {
        ciphertext: vec![fill; 32],
        tag: vec![fill; 16],
        iv: vec![fill; 12],
        salt: vec![fill; 16],
        kdf: KdfParams::default(),
    }
}

pub async fn audit_sequencing<S: Store>(store: &S) {
    let u1 = user("u1");
    let u2 = user("u2");

    let first = store
        .append_audit(&u1, &[AuditRecord::new(AuditAction::Requested, "a1")], 10)
        .await
        .unwrap();
    assert_eq!(first[0].seq, 1);

    let batch = store
        .append_audit(
            &u1,
            &[
                AuditRecord::new(AuditAction::Approved, "session"),
                AuditRecord::new(AuditAction::Issued, "session"),
            ],
            20,
        )
        .await
        .unwrap();
    assert_eq!(batch.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);

    // Sequences are per user.
    let other = store
        .append_audit(&u2, &[AuditRecord::new(AuditAction::Requested, "a9")], 30)
        .await
        .unwrap();
    assert_eq!(other[0].seq, 1);

    let all = store.list_audit(&u1, None).await.unwrap();
    assert_eq!(
        all.iter().map(|e| e.action).collect::<Vec<_>>(),
        vec![AuditAction::Requested, AuditAction::Approved, AuditAction::Issued]
    );
    assert_eq!(all[1].timestamp, 20);

    let since = store.list_audit(&u1, Some(2)).await.unwrap();
    assert_eq!(since.len(), 1);
    assert_eq!(since[0].seq, 3);

    let failure = store
        .append_audit(
            &u1,
            &[AuditRecord::new(AuditAction::ValidationFailed, "a1")
                .with_outcome(AuditOutcome::Failure("expired".into()))],
            40,
        )
        .await
        .unwrap();
    let listed = store.list_audit(&u1, Some(3)).await.unwrap();
    assert_eq!(listed, failure);
}

pub async fn audit_erasure<S: Store>(store: &S) {
    let u1 = user("u1");
    store
        .append_audit(
            &u1,
            &[
                AuditRecord::new(AuditAction::Requested, "a1"),
                AuditRecord::new(AuditAction::Denied, "session"),
            ],
            10,
        )
        .await
        .unwrap();

    let tombstone = store
        .erase_audit(&u1, &AuditRecord::new(AuditAction::Erased, "system"), 50)
        .await
        .unwrap();
    assert_eq!(tombstone.seq, 3);

    let remaining = store.list_audit(&u1, None).await.unwrap();
    assert_eq!(remaining, vec![tombstone]);

    let after = store
        .append_audit(&u1, &[AuditRecord::new(AuditAction::Requested, "a1")], 60)
        .await
        .unwrap();
    assert_eq!(after[0].seq, 4);
}

pub async fn vault_keys<S: Store>(store: &S) {
    let record = VaultKeyRecord {
        user_id: user("u1"),
        auth_method: AuthMethod::Passphrase,
        passphrase_bundle: bundle(1),
        recovery_bundle: bundle(2),
        created_at: 100,
        updated_at: 100,
    };

    assert_eq!(
        store.insert_vault_key(&record).await.unwrap(),
        InsertResult::Inserted
    );
    assert_eq!(
        store.insert_vault_key(&record).await.unwrap(),
        InsertResult::AlreadyExists
    );
    assert_eq!(
        store.get_vault_key(&record.user_id).await.unwrap(),
        Some(record.clone())
    );

    let rotated = VaultKeyRecord {
        passphrase_bundle: bundle(3),
        updated_at: 200,
        ..record.clone()
    };
    store.replace_vault_key(&rotated).await.unwrap();
    let fetched = store.get_vault_key(&record.user_id).await.unwrap().unwrap();
    assert_eq!(fetched.passphrase_bundle, bundle(3));
    assert_eq!(fetched.recovery_bundle, bundle(2));
    assert_eq!(fetched.created_at, 100);

    let stranger = VaultKeyRecord {
        user_id: user("nobody"),
        ..record.clone()
    };
    assert!(store.replace_vault_key(&stranger).await.is_err());

    assert!(store.delete_vault_key(&record.user_id).await.unwrap());
    assert!(!store.delete_vault_key(&record.user_id).await.unwrap());
    assert_eq!(store.get_vault_key(&record.user_id).await.unwrap(), None);
}

pub async fn requests<S: Store>(store: &S) {
    let r1 = request("u1", "attr.food.*", 1_000);
    let r2 = request("u1", "attr.finance.budget", 2_000);
    let r3 = request("u2", "attr.food", 3_000);
    for r in [&r1, &r2, &r3] {
        store.insert_request(r).await.unwrap();
    }

    assert_eq!(store.get_request(&r1.id).await.unwrap(), Some(r1.clone()));

    let pending = store
        .list_requests(&user("u1"), Some(RequestStatus::Pending))
        .await
        .unwrap();
    assert_eq!(
        pending.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![r1.id, r2.id]
    );

    // First terminal write wins.
    let token_id = TokenId::generate();
    assert!(store
        .resolve_request(&r1.id, RequestStatus::Approved, 5_000, Some(token_id))
        .await
        .unwrap());
    assert!(!store
        .resolve_request(&r1.id, RequestStatus::Denied, 5_001, None)
        .await
        .unwrap());
    let resolved = store.get_request(&r1.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, RequestStatus::Approved);
    assert_eq!(resolved.resolved_at, Some(5_000));
    assert_eq!(resolved.token_id, Some(token_id));

    // r2 deadline is 32_000, r3 is 33_000.
    let overdue = store.list_overdue(32_000).await.unwrap();
    assert_eq!(overdue.iter().map(|r| r.id).collect::<Vec<_>>(), vec![r2.id]);

    assert_eq!(store.purge_resolved_before(5_000).await.unwrap(), 0);
    assert_eq!(store.purge_resolved_before(5_001).await.unwrap(), 1);
    assert_eq!(store.get_request(&r1.id).await.unwrap(), None);

    assert_eq!(store.delete_requests_for(&user("u1")).await.unwrap(), 1);
    assert_eq!(store.list_requests(&user("u1"), None).await.unwrap(), vec![]);
    assert_eq!(store.list_requests(&user("u2"), None).await.unwrap().len(), 1);
}

pub async fn tokens_and_revocation<S: Store>(store: &S) {
    let live = issued("u1", "attr.food.*", 10_000);
    let expired = issued("u1", "attr.food", 500);
    let other_user = issued("u2", "attr.food", 10_000);
    for t in [&live, &expired, &other_user] {
        store.record_issued(t).await.unwrap();
    }

    let tokens = store.live_tokens_for(&user("u1"), 1_000).await.unwrap();
    assert_eq!(tokens, vec![live.clone()]);

    assert_eq!(
        store.revoke(&live.token_id, 2_000).await.unwrap(),
        RevokeResult::Revoked
    );
    assert_eq!(
        store.revoke(&live.token_id, 3_000).await.unwrap(),
        RevokeResult::AlreadyRevoked { revoked_at: 2_000 }
    );
    assert_eq!(store.revoked_at(&live.token_id).await.unwrap(), Some(2_000));
    assert!(store.live_tokens_for(&user("u1"), 1_000).await.unwrap().is_empty());

    let fetched = store.get_issued(&live.token_id).await.unwrap().unwrap();
    assert_eq!(fetched.revoked_at, Some(2_000));

    // Revoking an unknown id still lands in the set.
    let unknown = TokenId::generate();
    assert_eq!(
        store.revoke(&unknown, 1).await.unwrap(),
        RevokeResult::Revoked
    );

    assert_eq!(store.erase_tokens_for(&user("u1"), 9_000).await.unwrap(), 2);
    assert_eq!(store.get_issued(&expired.token_id).await.unwrap(), None);
    assert_eq!(store.revoked_at(&expired.token_id).await.unwrap(), Some(9_000));
    assert_eq!(store.revoked_at(&live.token_id).await.unwrap(), Some(2_000));
    assert!(store.get_issued(&other_user.token_id).await.unwrap().is_some());
}

pub async fn trust_links<S: Store>(store: &S) {
    let link = TrustLink {
        from_agent: agent("a1"),
        to_agent: agent("a2"),
        scope: Scope::parse("attr.food.*").unwrap(),
        user_id: user("u1"),
        token_id: TokenId::generate(),
        signed_by: TokenId::generate(),
        created_at: 100,
    };
    store.put_trust_link(&link).await.unwrap();

    // Same key replaces.
    let renewed = TrustLink {
        token_id: TokenId::generate(),
        created_at: 200,
        ..link.clone()
    };
    store.put_trust_link(&renewed).await.unwrap();

    assert_eq!(
        store.list_trust_links(&user("u1")).await.unwrap(),
        vec![renewed]
    );
    assert!(store.list_trust_links(&user("u2")).await.unwrap().is_empty());

    assert_eq!(store.delete_trust_links_for(&user("u1")).await.unwrap(), 1);
    assert!(store.list_trust_links(&user("u1")).await.unwrap().is_empty());
}
