//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a gate on a manual clock with a
//! deterministic signing key and a cheap KDF policy.

use std::sync::Arc;
use std::time::Duration;

use vaultgate::{Gate, GateConfig, Grant, Negotiation, NegotiatorConfig, Resolution};
use vaultgate_core::{
    AgentContext, AgentId, AuthMethod, KdfParams, KdfPolicy, Keypair, ManualClock, UserId,
};
use vaultgate_notify::MemoryNotifier;
use vaultgate_store::{MemoryStore, Store};
use vaultgate_vault::VaultSetup;

/// Fixed start time for fixtures, 2023-11-14T22:13:20Z.
pub const TEST_EPOCH: i64 = 1_700_000_000_000;

/// Seed for the fixture signing key.
pub const TEST_SEED: [u8; 32] = [0x42; 32];

/// Config used by fixtures: 30 s consent deadline, test KDF policy.
pub fn test_config() -> GateConfig {
    GateConfig::default()
        .with_kdf_policy(KdfPolicy::insecure_for_tests())
        .with_negotiator(
            NegotiatorConfig::default().with_request_timeout(Duration::from_secs(30)),
        )
}

/// The cheapest KDF parameters the fixture policy accepts.
pub fn test_kdf_params() -> KdfParams {
    KdfPolicy::insecure_for_tests().minimum_params()
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("valid user id")
}

pub fn agent(id: &str) -> AgentId {
    AgentId::new(id).expect("valid agent id")
}

pub fn ctx(user_id: &str, agent_id: &str) -> AgentContext {
    AgentContext::new(user(user_id), agent(agent_id))
}

/// A gate plus the clock driving it.
pub struct TestGate<S = MemoryStore> {
    pub gate: Gate<S>,
    pub clock: Arc<ManualClock>,
}

impl TestGate<MemoryStore> {
    /// A gate on a fresh in-memory store.
    pub fn new() -> Self {
        Self::on_store(MemoryStore::new())
    }
}

impl Default for TestGate<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> TestGate<S> {
    pub fn on_store(store: S) -> Self {
        Self::with_config(store, test_config())
    }

    pub fn with_config(store: S, config: GateConfig) -> Self {
        let clock = Arc::new(ManualClock::new(TEST_EPOCH));
        let gate = Gate::with_clock(
            Keypair::from_seed(&TEST_SEED),
            store,
            MemoryNotifier::default(),
            config,
            clock.clone(),
        );
        Self { gate, clock }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn session(&self, user_id: &str) -> String {
        self.gate
            .issue_session_token(&user(user_id))
            .await
            .expect("session token")
    }

    pub async fn owner(&self, user_id: &str) -> String {
        self.gate
            .issue_owner_token(&user(user_id))
            .await
            .expect("owner token")
    }

    /// Create bundles on the "device" and store them for `user_id`.
    pub async fn setup_vault(&self, user_id: &str, passphrase: &str) -> VaultSetup {
        let setup = VaultSetup::create(&user(user_id), passphrase, test_kdf_params())
            .expect("vault setup");
        let session = self.session(user_id).await;
        self.gate
            .vault()
            .setup(
                &session,
                &user(user_id),
                AuthMethod::Passphrase,
                setup.passphrase_bundle.clone(),
                setup.recovery_bundle.clone(),
            )
            .await
            .expect("store vault key");
        setup
    }

    /// Run a request for `scope` through to approval and return the grant.
    pub async fn grant(&self, user_id: &str, agent_id: &str, scope: &str, ttl: Duration) -> Grant {
        let negotiation = self
            .gate
            .negotiator()
            .request(&ctx(user_id, agent_id), scope, "fixture", ttl)
            .await
            .expect("request");

        let mut handle = match negotiation {
            Negotiation::Granted(grant) => return grant,
            Negotiation::Pending(handle) => handle,
        };
        let session = self.session(user_id).await;
        self.gate
            .negotiator()
            .approve(&session, &handle.request_id(), None)
            .await
            .expect("approve");

        match handle.wait().await.expect("resolution") {
            Resolution::Approved(grant) => grant,
            other => panic!("expected approval, got {other:?}"),
        }
    }
}

/// One fixture per user, each with its own store and clock.
pub fn isolated_gates(count: usize) -> Vec<TestGate> {
    (0..count).map(|_| TestGate::new()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgate::Tier;

    #[tokio::test]
    async fn test_fixture_grant() {
        let t = TestGate::new();
        let grant = t
            .grant("u1", "a1", "attr.food.*", Duration::from_secs(60))
            .await;

        assert_eq!(grant.issued.tier, Tier::Consent);
        assert_eq!(grant.issued.issued_at, TEST_EPOCH);
        assert!(t
            .gate
            .verify(grant.encoded(), Some("attr.food.diet"))
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test]
    async fn test_fixture_grant_reuses_live_token() {
        let t = TestGate::new();
        let first = t.grant("u1", "a1", "attr.food.*", Duration::from_secs(60)).await;
        let second = t.grant("u1", "a1", "attr.food.diet", Duration::from_secs(60)).await;
        assert_eq!(first.token_id(), second.token_id());
    }

    #[tokio::test]
    async fn test_fixture_vault_unlocks() {
        let t = TestGate::new();
        let setup = t.setup_vault("u1", "hunter2").await;
        let owner = t.owner("u1").await;
        let record = t.gate.vault().get(&owner, &user("u1")).await.unwrap();

        let key = vaultgate_vault::open_vault_key(
            &record.passphrase_bundle,
            b"hunter2",
            &user("u1"),
            vaultgate_core::BundlePath::Passphrase,
        )
        .unwrap();
        assert_eq!(key.as_bytes(), setup.vault_key.as_bytes());
    }

    #[tokio::test]
    async fn test_isolated_gates_share_signing_key() {
        let gates = isolated_gates(2);
        assert_eq!(gates[0].gate.public_key(), gates[1].gate.public_key());
    }
}
