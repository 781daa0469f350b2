//! Proptest generators for property-based testing.

use std::time::Duration;

use proptest::prelude::*;

use vaultgate_core::{
    AgentId, Holder, Keypair, RequiredScope, Scope, Tier, Token, TokenCodec, UserId,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// One scope segment.
pub fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}".prop_map(String::from)
}

/// A required (wildcard-free) scope of 1 to 4 segments.
pub fn required_scope() -> impl Strategy<Value = RequiredScope> {
    prop::collection::vec(segment(), 1..=4)
        .prop_map(|segs| RequiredScope::parse(&segs.join(".")).expect("generated scope"))
}

/// A grantable scope: exact, or a wildcard over 1 to 3 prefix segments.
pub fn granted_scope() -> impl Strategy<Value = Scope> {
    (prop::collection::vec(segment(), 1..=3), any::<bool>()).prop_map(|(segs, wildcard)| {
        let mut s = segs.join(".");
        if wildcard {
            s.push_str(".*");
        }
        Scope::parse(&s).expect("generated scope")
    })
}

/// A wildcard grant and a required scope strictly beneath it.
pub fn wildcard_and_descendant() -> impl Strategy<Value = (Scope, RequiredScope)> {
    (
        prop::collection::vec(segment(), 1..=3),
        prop::collection::vec(segment(), 1..=2),
    )
        .prop_map(|(prefix, rest)| {
            let granted = Scope::parse(&format!("{}.*", prefix.join("."))).expect("wildcard");
            let required = RequiredScope::parse(&format!("{}.{}", prefix.join("."), rest.join(".")))
                .expect("descendant");
            (granted, required)
        })
}

pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9]{1,12}".prop_map(|s| UserId::new(s).expect("generated user id"))
}

pub fn holder() -> impl Strategy<Value = Holder> {
    prop_oneof![
        Just(Holder::Session),
        "agent_[a-z0-9]{1,8}"
            .prop_map(|s| Holder::Agent(AgentId::new(s).expect("generated agent id"))),
    ]
}

pub fn tier() -> impl Strategy<Value = Tier> {
    prop_oneof![
        Just(Tier::VaultOwner),
        Just(Tier::Consent),
        Just(Tier::Session),
    ]
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_000_000_000_000i64
}

/// Parameters for minting a token.
#[derive(Debug, Clone)]
pub struct TokenParams {
    pub keypair: Keypair,
    pub subject: UserId,
    pub holder: Holder,
    pub tier: Tier,
    pub scope: Scope,
    pub ttl: Duration,
    pub issued_at: i64,
}

impl Arbitrary for TokenParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            keypair(),
            user_id(),
            holder(),
            tier(),
            granted_scope(),
            1u64..=90 * 24 * 3600 * 1000, // ttl ms
            timestamp(),
        )
            .prop_map(|(keypair, subject, holder, tier, scope, ttl_ms, issued_at)| TokenParams {
                keypair,
                subject,
                holder,
                tier,
                scope,
                ttl: Duration::from_millis(ttl_ms),
                issued_at,
            })
            .boxed()
    }
}

/// The codec the params' keypair signs with.
pub fn codec_for(params: &TokenParams) -> TokenCodec {
    TokenCodec::new("vaultgate-test", params.keypair.clone())
}

/// Mint a token from parameters.
pub fn token_from_params(params: &TokenParams) -> Token {
    codec_for(params)
        .mint_scope(
            &params.subject,
            params.holder.clone(),
            params.tier,
            params.scope.clone(),
            params.ttl,
            params.issued_at,
        )
        .expect("nonzero ttl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgate_core::codec::{decode, encode};
    use vaultgate_core::Verification;

    proptest! {
        #[test]
        fn test_minted_token_is_valid_until_expiry(params: TokenParams) {
            let codec = codec_for(&params);
            let token = token_from_params(&params);
            let encoded = encode(&token).unwrap();

            prop_assert!(codec.authenticate(&encoded, token.issued_at).is_valid());
            prop_assert!(codec.authenticate(&encoded, token.expires_at - 1).is_valid());
            prop_assert!(
                matches!(codec.authenticate(&encoded, token.expires_at), Verification::Expired(_)),
                "token must be expired at exp"
            );
        }

        #[test]
        fn test_decode_recovers_minted_token(params: TokenParams) {
            let token = token_from_params(&params);
            prop_assert_eq!(decode(&encode(&token).unwrap()).unwrap(), token);
        }

        #[test]
        fn test_any_signature_bit_flip_is_rejected(
            params: TokenParams,
            byte in 0usize..64,
            bit in 0u8..8,
        ) {
            let codec = codec_for(&params);
            let mut token = token_from_params(&params);
            token.signature.0[byte] ^= 1 << bit;

            let verification = codec.authenticate(&encode(&token).unwrap(), params.issued_at);
            prop_assert!(matches!(verification, Verification::SignatureMismatch));
        }

        #[test]
        fn test_other_key_is_rejected(params: TokenParams, other in keypair()) {
            prop_assume!(other.public_key() != params.keypair.public_key());
            let token = token_from_params(&params);
            let foreign = TokenCodec::new("vaultgate-test", other);

            let verification = foreign.authenticate(&encode(&token).unwrap(), params.issued_at);
            prop_assert!(matches!(verification, Verification::SignatureMismatch));
        }

        #[test]
        fn test_consent_wildcard_covers_descendants(
            (granted, required) in wildcard_and_descendant(),
        ) {
            prop_assert!(Tier::Consent.covers(&granted, &required));
            prop_assert!(Tier::VaultOwner.covers(&granted, &required));
            prop_assert!(!Tier::Session.covers(&granted, &required));
        }

        #[test]
        fn test_owner_covers_any_scope(granted in granted_scope(), required in required_scope()) {
            prop_assert!(Tier::VaultOwner.covers(&granted, &required));
        }
    }
}
