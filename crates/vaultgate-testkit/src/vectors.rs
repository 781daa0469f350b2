//! Verification vectors.
//!
//! Each vector describes one token, what happens to it, and the outcome
//! verification must report. Where several checks fail at once the vector
//! pins which failure wins.

use std::time::Duration;

use vaultgate_core::codec::encode;
use vaultgate_core::{AgentId, Holder, IssuedToken, Keypair, Tier, TokenCodec};
use vaultgate_store::TokenStore;

use crate::fixtures::{user, TestGate, TEST_EPOCH, TEST_SEED};

/// Damage done to the encoded token before it is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tamper {
    None,
    /// Flip one bit of the signature.
    FlipSignature,
    /// Signed by a key the gate does not trust.
    ForeignKey,
    /// Cut off the signature segment.
    Truncate,
    /// Replace the version prefix.
    WrongPrefix,
}

/// A verification test vector.
#[derive(Debug, Clone)]
pub struct VerificationVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub tier: Tier,
    /// Granted scope.
    pub scope: &'static str,
    pub ttl_ms: u64,
    pub tamper: Tamper,
    /// Revoke the token right after issue.
    pub revoke: bool,
    /// How long after issue the token is presented.
    pub present_after_ms: u64,
    /// Scope the verifier is asked for.
    pub required: Option<&'static str>,
    /// Expected failure kind, `None` for valid.
    pub expected: Option<&'static str>,
}

const BASE: VerificationVector = VerificationVector {
    name: "",
    tier: Tier::Consent,
    scope: "attr.food.*",
    ttl_ms: 60_000,
    tamper: Tamper::None,
    revoke: false,
    present_after_ms: 0,
    required: Some("attr.food.diet"),
    expected: None,
};

/// Get all verification vectors.
pub fn all_vectors() -> Vec<VerificationVector> {
    vec![
        VerificationVector {
            name: "wildcard grant covers child",
            ..BASE
        },
        VerificationVector {
            name: "wildcard grant does not cover its prefix",
            required: Some("attr.food"),
            expected: Some("scope_mismatch"),
            ..BASE
        },
        VerificationVector {
            name: "wildcard grant does not cover sibling",
            required: Some("attr.finance.budget"),
            expected: Some("scope_mismatch"),
            ..BASE
        },
        VerificationVector {
            name: "exact grant covers itself only",
            scope: "attr.food.diet",
            required: Some("attr.food.diet.vegan"),
            expected: Some("scope_mismatch"),
            ..BASE
        },
        VerificationVector {
            name: "valid one millisecond before expiry",
            present_after_ms: 59_999,
            ..BASE
        },
        VerificationVector {
            name: "expired exactly at expiry",
            present_after_ms: 60_000,
            expected: Some("expired"),
            ..BASE
        },
        VerificationVector {
            name: "revoked beats scope mismatch",
            revoke: true,
            required: Some("attr.finance.budget"),
            expected: Some("revoked"),
            ..BASE
        },
        VerificationVector {
            name: "expired beats revoked",
            revoke: true,
            present_after_ms: 120_000,
            expected: Some("expired"),
            ..BASE
        },
        VerificationVector {
            name: "signature beats expiry",
            tamper: Tamper::FlipSignature,
            present_after_ms: 120_000,
            expected: Some("signature_mismatch"),
            ..BASE
        },
        VerificationVector {
            name: "foreign key",
            tamper: Tamper::ForeignKey,
            expected: Some("signature_mismatch"),
            ..BASE
        },
        VerificationVector {
            name: "truncated token",
            tamper: Tamper::Truncate,
            expected: Some("malformed"),
            ..BASE
        },
        VerificationVector {
            name: "unknown version prefix",
            tamper: Tamper::WrongPrefix,
            expected: Some("malformed"),
            ..BASE
        },
        VerificationVector {
            name: "vault owner covers unrelated scope",
            tier: Tier::VaultOwner,
            scope: "vault.owner",
            required: Some("attr.finance.budget"),
            ..BASE
        },
        VerificationVector {
            name: "session covers no data scope",
            tier: Tier::Session,
            scope: "session",
            expected: Some("scope_mismatch"),
            ..BASE
        },
        VerificationVector {
            name: "session is valid without a scope",
            tier: Tier::Session,
            scope: "session",
            required: None,
            ..BASE
        },
    ]
}

/// Issue, damage and present the vector's token to a fresh gate. Returns
/// the failure kind, or `None` if it verified.
pub async fn run_vector(vector: &VerificationVector) -> Option<&'static str> {
    let t = TestGate::new();
    let subject = user("u1");
    let holder = match vector.tier {
        Tier::Consent => Holder::Agent(AgentId::new("a1").expect("agent id")),
        _ => Holder::Session,
    };
    let seed = match vector.tamper {
        Tamper::ForeignKey => [0x24; 32],
        _ => TEST_SEED,
    };
    let codec = TokenCodec::new(t.gate.config().issuer.clone(), Keypair::from_seed(&seed));

    let mut token = codec
        .mint(
            &subject,
            holder,
            vector.tier,
            vector.scope,
            Duration::from_millis(vector.ttl_ms),
            TEST_EPOCH,
        )
        .expect("vector token");
    let store = t.gate.store();
    store
        .record_issued(&IssuedToken::from_token(
            &token,
            encode(&token).expect("encode"),
            None,
        ))
        .await
        .expect("record issued");
    if vector.revoke {
        store.revoke(&token.id, TEST_EPOCH).await.expect("revoke");
    }

    if vector.tamper == Tamper::FlipSignature {
        token.signature.0[0] ^= 0x01;
    }
    let mut encoded = encode(&token).expect("encode");
    match vector.tamper {
        Tamper::Truncate => {
            if let Some(dot) = encoded.rfind('.') {
                encoded.truncate(dot);
            }
        }
        Tamper::WrongPrefix => encoded = encoded.replacen("vg1:", "vg0:", 1),
        _ => {}
    }

    t.advance(Duration::from_millis(vector.present_after_ms));
    let verification = t
        .gate
        .verify(&encoded, vector.required)
        .await
        .expect("verify");
    verification.error().map(|e| e.kind())
}

/// Run every vector and report `(name, passed, actual)`.
pub async fn verify_all_vectors() -> Vec<(String, bool, Option<&'static str>)> {
    let mut results = Vec::new();
    for vector in all_vectors() {
        let actual = run_vector(&vector).await;
        results.push((vector.name.to_string(), actual == vector.expected, actual));
    }
    results
}
