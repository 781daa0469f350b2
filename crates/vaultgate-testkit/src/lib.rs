//! # Vaultgate Testkit
//!
//! Testing utilities for vaultgate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a gate on a manual clock with a fixed signing key
//! - **Fault injection**: [`FaultyStore`] fails audit writes on demand
//! - **Generators**: Proptest strategies for scopes and tokens
//! - **Verification vectors**: pinned outcomes for token checks, including
//!   which failure wins when several apply
//!
//! ## Test Fixtures
//!
//! ```rust
//! use std::time::Duration;
//! use vaultgate_testkit::fixtures::TestGate;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let t = TestGate::new();
//!     let grant = t.grant("u1", "a1", "attr.food.*", Duration::from_secs(60)).await;
//!     assert!(t.gate.verify(grant.encoded(), Some("attr.food.diet")).await.unwrap().is_valid());
//! });
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use vaultgate_testkit::generators::{codec_for, token_from_params, TokenParams};
//!
//! proptest! {
//!     #[test]
//!     fn minted_tokens_authenticate(params: TokenParams) {
//!         let token = token_from_params(&params);
//!         let encoded = vaultgate_core::codec::encode(&token).unwrap();
//!         prop_assert!(codec_for(&params).authenticate(&encoded, params.issued_at).is_valid());
//!     }
//! }
//! ```

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use faulty::FaultyStore;
pub use fixtures::{test_config, TestGate, TEST_EPOCH, TEST_SEED};
pub use generators::{token_from_params, TokenParams};
pub use vectors::{all_vectors, run_vector, verify_all_vectors, VerificationVector};
