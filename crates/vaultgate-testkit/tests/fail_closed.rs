//! Nothing takes effect without its audit entry.

use std::time::Duration;

use vaultgate::{AuditAction, AuditConfig, ErrorKind, Negotiation, RequestStatus, Tier};
use vaultgate_store::MemoryStore;
use vaultgate_testkit::fixtures::{ctx, test_config, user};
use vaultgate_testkit::{FaultyStore, TestGate};

const HOUR: Duration = Duration::from_secs(3600);

fn faulty_gate() -> TestGate<FaultyStore<MemoryStore>> {
    let config = test_config().with_audit(
        AuditConfig::default()
            .with_max_attempts(3)
            .with_retry_backoff(Duration::from_millis(1)),
    );
    TestGate::with_config(FaultyStore::new(MemoryStore::new()), config)
}

#[tokio::test]
async fn test_no_token_without_audit() -> anyhow::Result<()> {
    let t = faulty_gate();
    let Negotiation::Pending(handle) = t
        .gate
        .negotiator()
        .request(&ctx("u1", "a1"), "attr.food.*", "p", HOUR)
        .await?
    else {
        panic!("expected a fresh request");
    };
    let session = t.session("u1").await;

    t.gate.store().fail_audit();
    let err = t
        .gate
        .negotiator()
        .approve(&session, &handle.request_id(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuditWriteFailed);
    assert_eq!(t.gate.store().injected_failures(), 3);

    let consent_tokens = t
        .gate
        .negotiator()
        .list_tokens(&user("u1"))
        .await?
        .into_iter()
        .filter(|tok| tok.tier == Tier::Consent)
        .count();
    assert_eq!(consent_tokens, 0);
    assert_eq!(
        t.gate
            .negotiator()
            .status(&handle.request_id())
            .await?
            .status,
        RequestStatus::Pending
    );
    assert_eq!(handle.poll(), None);

    t.gate.store().heal();
    let grant = t
        .gate
        .negotiator()
        .approve(&session, &handle.request_id(), None)
        .await?;
    assert!(t.gate.verify(grant.encoded(), Some("attr.food.diet")).await?.is_valid());
    Ok(())
}

#[tokio::test]
async fn test_failed_resolve_withdraws_the_token() -> anyhow::Result<()> {
    let t = faulty_gate();
    let negotiator = t.gate.negotiator();
    let Negotiation::Pending(handle) = negotiator
        .request(&ctx("u1", "a1"), "attr.food.*", "p", HOUR)
        .await?
    else {
        panic!("expected a fresh request");
    };
    let session = t.session("u1").await;

    t.gate.store().fail_next_resolve(1);
    let err = negotiator
        .approve(&session, &handle.request_id(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(
        negotiator.status(&handle.request_id()).await?.status,
        RequestStatus::Pending
    );
    assert_eq!(handle.poll(), None);

    let consent_tokens = negotiator
        .list_tokens(&user("u1"))
        .await?
        .into_iter()
        .filter(|tok| tok.tier == Tier::Consent)
        .count();
    assert_eq!(consent_tokens, 0);

    // The withdrawn token must not answer later requests.
    let joined = negotiator
        .request(&ctx("u1", "a2"), "attr.food.diet", "p", HOUR)
        .await?;
    assert!(matches!(joined, Negotiation::Pending(_)));

    let trail: Vec<_> = t
        .gate
        .audit_log(&user("u1"), None)
        .await?
        .into_iter()
        .filter(|e| e.request_id == Some(handle.request_id()))
        .collect();
    let withdrawn = trail
        .iter()
        .find(|e| e.action == AuditAction::Revoked)
        .expect("withdrawal is audited");
    let issued = trail
        .iter()
        .find(|e| e.action == AuditAction::Issued)
        .expect("issuance is audited");
    assert_eq!(withdrawn.token_id, issued.token_id);
    assert!(withdrawn.seq > issued.seq);

    let grant = negotiator
        .approve(&session, &handle.request_id(), None)
        .await?;
    assert!(t.gate.verify(grant.encoded(), Some("attr.food.diet")).await?.is_valid());
    assert_ne!(Some(grant.token_id()), withdrawn.token_id);
    Ok(())
}

#[tokio::test]
async fn test_failed_resolve_keeps_denial_pending() -> anyhow::Result<()> {
    let t = faulty_gate();
    let negotiator = t.gate.negotiator();
    let Negotiation::Pending(handle) = negotiator
        .request(&ctx("u1", "a1"), "attr.food.*", "p", HOUR)
        .await?
    else {
        panic!("expected a fresh request");
    };
    let session = t.session("u1").await;

    t.gate.store().fail_next_resolve(1);
    negotiator
        .deny(&session, &handle.request_id())
        .await
        .unwrap_err();
    assert_eq!(negotiator.list_pending(&user("u1")).await?.len(), 1);
    assert_eq!(handle.poll(), None);

    negotiator.deny(&session, &handle.request_id()).await?;
    assert_eq!(
        negotiator.status(&handle.request_id()).await?.status,
        RequestStatus::Denied
    );
    Ok(())
}

#[tokio::test]
async fn test_no_request_without_audit() -> anyhow::Result<()> {
    let t = faulty_gate();
    t.gate.store().fail_audit();

    let err = t
        .gate
        .negotiator()
        .request(&ctx("u1", "a1"), "attr.food.*", "p", HOUR)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuditWriteFailed);

    t.gate.store().heal();
    assert!(t.gate.negotiator().list_pending(&user("u1")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_no_session_without_audit() -> anyhow::Result<()> {
    let t = faulty_gate();
    t.gate.store().fail_audit();

    let err = t.gate.issue_session_token(&user("u1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuditWriteFailed);
    assert!(!err.kind().is_client_error());

    t.gate.store().heal();
    assert!(t.gate.negotiator().list_tokens(&user("u1")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deny_stays_pending_without_audit() -> anyhow::Result<()> {
    let t = faulty_gate();
    let Negotiation::Pending(handle) = t
        .gate
        .negotiator()
        .request(&ctx("u1", "a1"), "attr.food.*", "p", HOUR)
        .await?
    else {
        panic!("expected a fresh request");
    };
    let session = t.session("u1").await;

    t.gate.store().fail_audit();
    let err = t
        .gate
        .negotiator()
        .deny(&session, &handle.request_id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuditWriteFailed);

    t.gate.store().heal();
    assert_eq!(t.gate.negotiator().list_pending(&user("u1")).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_expiry_retried_by_next_sweep() -> anyhow::Result<()> {
    let t = faulty_gate();
    let Negotiation::Pending(mut handle) = t
        .gate
        .negotiator()
        .request(&ctx("u1", "a1"), "attr.food.*", "p", HOUR)
        .await?
    else {
        panic!("expected a fresh request");
    };
    t.advance(Duration::from_secs(30));

    t.gate.store().fail_audit();
    assert_eq!(t.gate.negotiator().sweep_expired().await?, 0);
    assert_eq!(handle.poll(), None);

    t.gate.store().heal();
    assert_eq!(t.gate.negotiator().sweep_expired().await?, 1);
    assert_eq!(
        handle.wait().await?,
        vaultgate::Resolution::Expired
    );
    Ok(())
}

#[tokio::test]
async fn test_transient_failures_are_retried() -> anyhow::Result<()> {
    let t = faulty_gate();
    t.gate.store().fail_next_audit(2);

    let session = t.gate.issue_session_token(&user("u1")).await?;
    assert!(t.gate.verify(&session, None).await?.is_valid());
    assert_eq!(t.gate.store().injected_failures(), 2);

    let issued = t
        .gate
        .audit_log(&user("u1"), None)
        .await?
        .into_iter()
        .filter(|e| e.action == AuditAction::Issued)
        .count();
    assert_eq!(issued, 1);
    Ok(())
}

#[tokio::test]
async fn test_revocation_holds_even_if_audit_fails() -> anyhow::Result<()> {
    let t = faulty_gate();
    let grant = t.grant("u1", "a1", "attr.food.*", HOUR).await;
    let session = t.session("u1").await;

    t.gate.store().fail_audit();
    let err = t
        .gate
        .negotiator()
        .revoke(&session, &grant.token_id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuditWriteFailed);

    t.gate.store().heal();
    let v = t.gate.verify(grant.encoded(), Some("attr.food.diet")).await?;
    assert_eq!(v.error().map(|e| e.kind()), Some("revoked"));
    Ok(())
}
