//! Token wire format, minting, and stateless verification.
//!
//! Wire form: `vg1:<base64url(payload)>.<base64url(signature)>`, where the
//! payload is the JSON claims object `{jti, iss, sub, holder, tier, scope,
//! iat, exp}` in that field order. The signature is Ed25519 over
//! `SIGN_DOMAIN || canonical_claims`, and the canonical claims are always
//! re-derived from the parsed values before checking, never taken from the
//! received bytes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::time::Duration;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::scope::{RequiredScope, Scope};
use crate::tier::Tier;
use crate::time::duration_millis;
use crate::token::{Holder, Token, TokenClaims, Verification};
use crate::types::{TokenId, UserId};

/// Protocol version prefix.
pub const TOKEN_PREFIX: &str = "vg1";

/// Domain separator for token signatures.
pub const SIGN_DOMAIN: &[u8] = b"vaultgate/token/v1\0";

/// Mints and verifies tokens for one issuer identity.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    issuer: String,
    keypair: Keypair,
}

impl TokenCodec {
    pub fn new(issuer: impl Into<String>, keypair: Keypair) -> Self {
        Self {
            issuer: issuer.into(),
            keypair,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Mint a token from a raw scope string.
    ///
    /// Fails with `InvalidScope` for an empty or ill-formed scope and with
    /// `InvalidTtl` for a zero lifetime.
    pub fn mint(
        &self,
        subject: &UserId,
        holder: Holder,
        tier: Tier,
        scope: &str,
        ttl: Duration,
        now: i64,
    ) -> Result<Token, CoreError> {
        let scope = Scope::parse(scope)?;
        self.mint_scope(subject, holder, tier, scope, ttl, now)
    }

    /// Mint a token for an already-parsed scope.
    pub fn mint_scope(
        &self,
        subject: &UserId,
        holder: Holder,
        tier: Tier,
        scope: Scope,
        ttl: Duration,
        now: i64,
    ) -> Result<Token, CoreError> {
        if ttl.is_zero() {
            return Err(CoreError::InvalidTtl);
        }

        let mut token = Token {
            id: TokenId::generate(),
            issuer: self.issuer.clone(),
            subject: subject.clone(),
            holder,
            tier,
            scope,
            issued_at: now,
            expires_at: now.saturating_add(duration_millis(ttl)),
            signature: Ed25519Signature::from_bytes([0u8; 64]),
        };

        let message = signed_message(&canonical_claims(&token.claims())?);
        token.signature = self.keypair.sign(&message);
        Ok(token)
    }

    /// Verify signature, expiry and, if given, scope coverage.
    pub fn verify(
        &self,
        encoded: &str,
        expected: Option<&RequiredScope>,
        now: i64,
    ) -> Verification {
        match self.authenticate(encoded, now) {
            Verification::Valid(token) => match expected {
                Some(required) if !token.covers(required) => Verification::ScopeMismatch {
                    token,
                    required: required.clone(),
                },
                _ => Verification::Valid(token),
            },
            other => other,
        }
    }

    /// Verify signature and expiry only.
    pub fn authenticate(&self, encoded: &str, now: i64) -> Verification {
        let token = match decode(encoded) {
            Ok(token) => token,
            Err(reason) => return Verification::Malformed(reason),
        };

        if token.issuer != self.issuer {
            return Verification::SignatureMismatch;
        }

        let canonical = match canonical_claims(&token.claims()) {
            Ok(bytes) => bytes,
            Err(e) => return Verification::Malformed(e.to_string()),
        };
        if !self
            .keypair
            .public_key()
            .verify(&signed_message(&canonical), &token.signature)
        {
            return Verification::SignatureMismatch;
        }

        if token.is_expired(now) {
            return Verification::Expired(token);
        }

        Verification::Valid(token)
    }
}

/// Encode a token to its wire form.
pub fn encode(token: &Token) -> Result<String, CoreError> {
    let payload = canonical_claims(&token.claims())?;
    Ok(format!(
        "{}:{}.{}",
        TOKEN_PREFIX,
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(token.signature.as_bytes())
    ))
}

/// Parse a token without checking its signature or expiry.
///
/// The result is untrusted; use [`TokenCodec::verify`] for authorization.
pub fn decode(encoded: &str) -> Result<Token, String> {
    let (prefix, body) = encoded
        .split_once(':')
        .ok_or_else(|| "missing version prefix".to_string())?;
    if prefix != TOKEN_PREFIX {
        return Err(format!("unsupported version prefix {prefix:?}"));
    }

    let (payload_b64, sig_b64) = body
        .split_once('.')
        .ok_or_else(|| "missing signature".to_string())?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| format!("payload is not base64: {e}"))?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| format!("signature is not base64: {e}"))?;
    let signature = Ed25519Signature::try_from(sig_bytes.as_slice())
        .map_err(|_| format!("signature must be 64 bytes, got {}", sig_bytes.len()))?;

    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|e| format!("bad claims: {e}"))?;

    if claims.exp <= claims.iat {
        return Err("exp must be after iat".into());
    }

    Ok(Token {
        id: TokenId::from_hex(&claims.jti).map_err(|e| format!("bad jti: {e}"))?,
        subject: UserId::new(claims.sub).map_err(|e| e.to_string())?,
        holder: Holder::from_claim(&claims.holder).ok_or_else(|| "empty holder".to_string())?,
        tier: claims.tier,
        scope: Scope::parse(&claims.scope).map_err(|e| e.to_string())?,
        issued_at: claims.iat,
        expires_at: claims.exp,
        issuer: claims.iss,
        signature,
    })
}

fn canonical_claims(claims: &TokenClaims) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(claims).map_err(|e| CoreError::EncodingError(e.to_string()))
}

fn signed_message(canonical: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SIGN_DOMAIN.len() + canonical.len());
    buf.extend_from_slice(SIGN_DOMAIN);
    buf.extend_from_slice(canonical);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentId;

    const NOW: i64 = 1_736_870_400_000;

    fn codec() -> TokenCodec {
        TokenCodec::new("vaultgate", Keypair::from_seed(&[0x42; 32]))
    }

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    fn agent() -> Holder {
        Holder::Agent(AgentId::new("a1").unwrap())
    }

    fn mint(codec: &TokenCodec, scope: &str, ttl: Duration) -> String {
        let token = codec
            .mint(&user(), agent(), Tier::Consent, scope, ttl, NOW)
            .unwrap();
        encode(&token).unwrap()
    }

    #[test]
    fn test_mint_then_verify() {
        let codec = codec();
        let encoded = mint(&codec, "attr.food.*", Duration::from_secs(60));
        assert!(encoded.starts_with("vg1:"));

        let required = RequiredScope::parse("attr.food.dietary_restrictions").unwrap();
        let token = codec
            .verify(&encoded, Some(&required), NOW + 1)
            .into_result()
            .unwrap();
        assert_eq!(token.subject, user());
        assert_eq!(token.holder, agent());
        assert_eq!(token.expires_at, NOW + 60_000);
    }

    #[test]
    fn test_mint_rejects_bad_scope_and_ttl() {
        let codec = codec();
        assert!(matches!(
            codec.mint(&user(), agent(), Tier::Consent, "", Duration::from_secs(1), NOW),
            Err(CoreError::InvalidScope(_))
        ));
        assert!(matches!(
            codec.mint(&user(), agent(), Tier::Consent, "Attr", Duration::from_secs(1), NOW),
            Err(CoreError::InvalidScope(_))
        ));
        assert!(matches!(
            codec.mint(&user(), agent(), Tier::Consent, "attr", Duration::ZERO, NOW),
            Err(CoreError::InvalidTtl)
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let encoded = mint(&codec, "attr.food", Duration::from_millis(500));

        assert!(codec.verify(&encoded, None, NOW + 499).is_valid());
        assert!(matches!(
            codec.verify(&encoded, None, NOW + 500),
            Verification::Expired(_)
        ));
        assert!(matches!(
            codec.verify(&encoded, None, NOW + 10_000),
            Verification::Expired(_)
        ));
    }

    #[test]
    fn test_scope_mismatch() {
        let codec = codec();
        let encoded = mint(&codec, "attr.food.*", Duration::from_secs(60));
        let required = RequiredScope::parse("attr.finance.budget").unwrap();
        assert!(matches!(
            codec.verify(&encoded, Some(&required), NOW),
            Verification::ScopeMismatch { .. }
        ));
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let codec = codec();
        let token = codec
            .mint(&user(), agent(), Tier::Consent, "attr.food", Duration::from_secs(60), NOW)
            .unwrap();
        let mut forged = token.clone();
        forged.scope = Scope::parse("attr.*").unwrap();
        let encoded = encode(&forged).unwrap();

        assert_eq!(
            codec.verify(&encoded, None, NOW),
            Verification::SignatureMismatch
        );
    }

    #[test]
    fn test_other_issuer_key_fails_signature() {
        let other = TokenCodec::new("vaultgate", Keypair::from_seed(&[0x07; 32]));
        let encoded = mint(&other, "attr.food", Duration::from_secs(60));
        assert_eq!(
            codec().verify(&encoded, None, NOW),
            Verification::SignatureMismatch
        );
    }

    #[test]
    fn test_malformed_inputs() {
        let codec = codec();
        for bad in [
            "",
            "garbage",
            "vg2:abc.def",
            "vg1:abc",
            "vg1:!!!.AAAA",
            "vg1:e30.AAAA",
        ] {
            assert!(
                matches!(codec.verify(bad, None, NOW), Verification::Malformed(_)),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_encoding_is_deterministic_for_same_token() {
        let codec = codec();
        let token = codec
            .mint(&user(), agent(), Tier::Consent, "attr.food", Duration::from_secs(60), NOW)
            .unwrap();
        assert_eq!(encode(&token).unwrap(), encode(&token).unwrap());
        assert_eq!(decode(&encode(&token).unwrap()).unwrap(), token);
    }
}
