//! AES-256-GCM with detached tags.
//!
//! Ciphertext, tag and IV are kept apart because the vault-key bundle stores
//! them as separate fields.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use vaultgate_core::vault::{IV_LEN, TAG_LEN};

use crate::error::{Result, VaultError};

/// A 256-bit AES-GCM key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; 32]);

impl AeadKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| VaultError::EncryptionError(e.to_string()))
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(..)")
    }
}

/// Output of [`seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
    pub iv: [u8; IV_LEN],
}

/// Generate a random 96-bit IV.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
pub fn seal(key: &AeadKey, plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let iv = generate_iv();
    let mut buf = plaintext.to_vec();
    let tag = key
        .cipher()?
        .encrypt_in_place_detached(Nonce::from_slice(&iv), aad, &mut buf)
        .map_err(|e| VaultError::EncryptionError(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok(Sealed {
        ciphertext: buf,
        tag: tag_bytes,
        iv,
    })
}

/// Authenticate and decrypt.
///
/// The tag is checked before any plaintext is released; on mismatch the
/// working buffer is wiped and `DecryptionFailed` is returned.
pub fn open(
    key: &AeadKey,
    ciphertext: &[u8],
    tag: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::DecryptionFailed);
    }

    let mut buf = Zeroizing::new(ciphertext.to_vec());
    key.cipher()?
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            aad,
            buf.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| VaultError::DecryptionFailed)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seal_open() {
        let key = AeadKey::generate();
        let sealed = seal(&key, b"hello vault", b"aad").unwrap();
        assert_ne!(sealed.ciphertext, b"hello vault");

        let plain = open(&key, &sealed.ciphertext, &sealed.tag, &sealed.iv, b"aad").unwrap();
        assert_eq!(plain.as_slice(), b"hello vault");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&AeadKey::generate(), b"secret", b"").unwrap();
        let err = open(&AeadKey::generate(), &sealed.ciphertext, &sealed.tag, &sealed.iv, b"")
            .unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_tag_and_ciphertext_fail() {
        let key = AeadKey::generate();
        let sealed = seal(&key, b"secret", b"").unwrap();

        let mut tag = sealed.tag;
        tag[0] ^= 1;
        assert!(matches!(
            open(&key, &sealed.ciphertext, &tag, &sealed.iv, b""),
            Err(VaultError::DecryptionFailed)
        ));

        let mut ct = sealed.ciphertext.clone();
        ct[0] ^= 1;
        assert!(matches!(
            open(&key, &ct, &sealed.tag, &sealed.iv, b""),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = AeadKey::generate();
        let sealed = seal(&key, b"secret", b"u1/passphrase").unwrap();
        assert!(open(&key, &sealed.ciphertext, &sealed.tag, &sealed.iv, b"u2/passphrase").is_err());
    }

    #[test]
    fn test_bad_lengths_fail_closed() {
        let key = AeadKey::generate();
        let sealed = seal(&key, b"secret", b"").unwrap();
        assert!(open(&key, &sealed.ciphertext, &sealed.tag[..8], &sealed.iv, b"").is_err());
        assert!(open(&key, &sealed.ciphertext, &sealed.tag, &[0u8; 16], b"").is_err());
    }

    proptest! {
        #[test]
        fn prop_open_recovers_plaintext(plaintext in prop::collection::vec(any::<u8>(), 0..256)) {
            let key = AeadKey::generate();
            let sealed = seal(&key, &plaintext, b"ctx").unwrap();
            let opened = open(&key, &sealed.ciphertext, &sealed.tag, &sealed.iv, b"ctx").unwrap();
            prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
        }
    }
}
