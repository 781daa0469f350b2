//! Export envelopes.
//!
//! When a user approves a consent request from their device, the session
//! may export the requested data to the agent. The data is sealed under a
//! fresh single-use export key, and that key is wrapped to the agent's
//! X25519 public key through an ephemeral key agreement. The server only
//! forwards the CBOR-encoded envelope as opaque bytes.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use vaultgate_core::RequestId;

use crate::aead::{self, AeadKey};
use crate::error::{Result, VaultError};
use crate::exchange::{EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};

const DATA_AAD: &[u8] = b"vaultgate/export/v1/data\0";
const KEY_AAD: &[u8] = b"vaultgate/export/v1/key\0";

/// Data exported for one consent request, readable only by one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    /// The request this export answers. Bound into both layers.
    pub request_id: RequestId,

    /// Sender's side of the key agreement.
    pub ephemeral_public: X25519PublicKey,

    /// Export key, sealed under the agreed wrap key.
    pub wrapped_key: Vec<u8>,
    pub key_tag: [u8; 16],
    pub key_iv: [u8; 12],

    /// Exported data, sealed under the export key.
    pub ciphertext: Vec<u8>,
    pub tag: [u8; 16],
    pub iv: [u8; 12],
}

impl ExportEnvelope {
    /// Seal `plaintext` for `recipient`.
    pub fn seal(
        request_id: RequestId,
        plaintext: &[u8],
        recipient: &X25519PublicKey,
    ) -> Result<Self> {
        let export_key = AeadKey::generate();
        let data = aead::seal(&export_key, plaintext, &aad(DATA_AAD, &request_id))?;

        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral
            .diffie_hellman(recipient)
            .derive_wrap_key(request_id.as_bytes());
        let key = aead::seal(&wrap_key, export_key.as_bytes(), &aad(KEY_AAD, &request_id))?;

        Ok(Self {
            request_id,
            ephemeral_public,
            wrapped_key: key.ciphertext,
            key_tag: key.tag,
            key_iv: key.iv,
            ciphertext: data.ciphertext,
            tag: data.tag,
            iv: data.iv,
        })
    }

    /// Open with the agent's static secret.
    pub fn open(&self, recipient_secret: &X25519StaticSecret) -> Result<Zeroizing<Vec<u8>>> {
        let wrap_key = recipient_secret
            .diffie_hellman(&self.ephemeral_public)
            .derive_wrap_key(self.request_id.as_bytes());
        let key_bytes = aead::open(
            &wrap_key,
            &self.wrapped_key,
            &self.key_tag,
            &self.key_iv,
            &aad(KEY_AAD, &self.request_id),
        )?;
        let export_key = AeadKey::from_slice(&key_bytes)?;

        aead::open(
            &export_key,
            &self.ciphertext,
            &self.tag,
            &self.iv,
            &aad(DATA_AAD, &self.request_id),
        )
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| VaultError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| VaultError::SerializationError(e.to_string()))
    }
}

fn aad(domain: &[u8], request_id: &RequestId) -> Vec<u8> {
    let mut out = Vec::with_capacity(domain.len() + 16);
    out.extend_from_slice(domain);
    out.extend_from_slice(request_id.as_bytes());
    out
}
