//! Passphrase key derivation (Argon2id).

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use vaultgate_core::KdfParams;

use crate::aead::AeadKey;
use crate::error::{Result, VaultError};

/// Salt length used for new bundles (128 bits).
pub const SALT_LEN: usize = 16;

/// Generate a random per-bundle salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit wrapping key from `secret` and `salt`.
pub fn derive_key(secret: &[u8], salt: &[u8], params: &KdfParams) -> Result<AeadKey> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| VaultError::KeyDerivationError(e.to_string()))?;

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut out = [0u8; 32];
    argon
        .hash_password_into(secret, salt, &mut out)
        .map_err(|e| VaultError::KeyDerivationError(e.to_string()))?;

    let key = AeadKey::from_bytes(out);
    zeroize::Zeroize::zeroize(&mut out);
    Ok(key)
}
