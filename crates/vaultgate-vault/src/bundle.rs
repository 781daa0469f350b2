//! Vault-key sealing.
//!
//! The vault key is a random 256-bit key generated on the device. It is
//! stored server-side only as two [`KeyBundle`]s: one wrapped by a
//! passphrase-derived key and one by an independent recovery secret. Each
//! bundle binds the user id and its path label as associated data, so a
//! bundle copied to another user or path fails to open.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use vaultgate_core::{BundlePath, KdfParams, KeyBundle, UserId};

use crate::aead::{self, AeadKey};
use crate::error::{Result, VaultError};
use crate::kdf;

const AAD_DOMAIN: &[u8] = b"vaultgate/vault-key/v1\0";

/// The plaintext vault key. Only ever exists on the device.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; 32]);

impl VaultKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Use the vault key directly as a data-encryption key.
    pub fn as_aead_key(&self) -> AeadKey {
        AeadKey::from_bytes(self.0)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

/// A high-entropy recovery secret, shown to the user once at setup.
///
/// Rendered as eight dash-separated groups of hex.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RecoverySecret(String);

impl RecoverySecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex = Zeroizing::new(hex::encode(bytes));
        bytes.zeroize();

        let groups: Vec<&str> = hex
            .as_bytes()
            .chunks(8)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        Self(groups.join("-"))
    }

    /// Accept user input, ignoring case, whitespace and dashes.
    pub fn from_phrase(phrase: &str) -> Self {
        let hex: String = phrase
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let groups: Vec<&str> = hex
            .as_bytes()
            .chunks(8)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        Self(groups.join("-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RecoverySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecoverySecret(..)")
    }
}

fn associated_data(user_id: &UserId, path: BundlePath) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + user_id.as_str().len() + 12);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.extend_from_slice(user_id.as_str().as_bytes());
    aad.push(0);
    aad.extend_from_slice(path.label().as_bytes());
    aad
}

/// Wrap `vault_key` under a key derived from `secret`.
pub fn seal_vault_key(
    vault_key: &VaultKey,
    secret: &[u8],
    user_id: &UserId,
    path: BundlePath,
    params: KdfParams,
) -> Result<KeyBundle> {
    let salt = kdf::generate_salt();
    let wrap_key = kdf::derive_key(secret, &salt, &params)?;
    let sealed = aead::seal(&wrap_key, vault_key.as_bytes(), &associated_data(user_id, path))?;

    Ok(KeyBundle {
        ciphertext: sealed.ciphertext,
        tag: sealed.tag.to_vec(),
        iv: sealed.iv.to_vec(),
        salt: salt.to_vec(),
        kdf: params,
    })
}

/// Unwrap a bundle. Fails with `DecryptionFailed` on a wrong secret, a
/// tampered bundle, or a bundle sealed for another user or path.
pub fn open_vault_key(
    bundle: &KeyBundle,
    secret: &[u8],
    user_id: &UserId,
    path: BundlePath,
) -> Result<VaultKey> {
    let wrap_key = kdf::derive_key(secret, &bundle.salt, &bundle.kdf)?;
    let plain = aead::open(
        &wrap_key,
        &bundle.ciphertext,
        &bundle.tag,
        &bundle.iv,
        &associated_data(user_id, path),
    )?;

    let arr: [u8; 32] = plain
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::InvalidKeyLength(plain.len()))?;
    Ok(VaultKey(arr))
}

/// Open `bundle` with `old_secret` and re-seal the same vault key under
/// `new_secret` with a fresh salt and IV.
pub fn rewrap(
    bundle: &KeyBundle,
    old_secret: &[u8],
    new_secret: &[u8],
    user_id: &UserId,
    path: BundlePath,
    params: KdfParams,
) -> Result<KeyBundle> {
    let vault_key = open_vault_key(bundle, old_secret, user_id, path)?;
    seal_vault_key(&vault_key, new_secret, user_id, path, params)
}

/// Everything a device produces when a user first sets up their vault.
///
/// The two bundles go to the server; the vault key and recovery secret stay
/// on the device (the recovery secret is shown to the user once).
pub struct VaultSetup {
    pub vault_key: VaultKey,
    pub recovery_secret: RecoverySecret,
    pub passphrase_bundle: KeyBundle,
    pub recovery_bundle: KeyBundle,
}

impl VaultSetup {
    pub fn create(user_id: &UserId, passphrase: &str, params: KdfParams) -> Result<Self> {
        let vault_key = VaultKey::generate();
        let recovery_secret = RecoverySecret::generate();

        let passphrase_bundle = seal_vault_key(
            &vault_key,
            passphrase.as_bytes(),
            user_id,
            BundlePath::Passphrase,
            params,
        )?;
        let recovery_bundle = seal_vault_key(
            &vault_key,
            recovery_secret.as_str().as_bytes(),
            user_id,
            BundlePath::Recovery,
            params,
        )?;

        Ok(Self {
            vault_key,
            recovery_secret,
            passphrase_bundle,
            recovery_bundle,
        })
    }
}
