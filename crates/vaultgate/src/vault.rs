//! Server-side vault-key records.
//!
//! A dumb, access-controlled blob store. The server never derives keys or
//! decrypts; it checks bundle metadata against the KDF policy, stores the two
//! ciphertext bundles, and hands them back to the vault owner.

use std::sync::Arc;

use tokio::sync::Mutex;

use vaultgate_core::{AuthMethod, BundlePath, Clock, KdfPolicy, KeyBundle, UserId, VaultKeyRecord};
use vaultgate_store::{InsertResult, Store};

use crate::error::{GateError, Result};
use crate::verifier::TokenVerifier;

pub struct VaultKeys<S> {
    store: Arc<S>,
    verifier: Arc<TokenVerifier<S>>,
    policy: KdfPolicy,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-replace so a passphrase and a recovery rotation
    // cannot overwrite each other.
    rotation: Mutex<()>,
}

impl<S: Store> VaultKeys<S> {
    pub fn new(
        store: Arc<S>,
        verifier: Arc<TokenVerifier<S>>,
        policy: KdfPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            policy,
            clock,
            rotation: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &KdfPolicy {
        &self.policy
    }

    /// Store a new user's vault record.
    ///
    /// `identity` is a session or owner token for `user_id`. Fails with
    /// `AlreadyExists` if the user has a vault; use the rotate operations to
    /// change it.
    pub async fn setup(
        &self,
        identity: &str,
        user_id: &UserId,
        auth_method: AuthMethod,
        passphrase_bundle: KeyBundle,
        recovery_bundle: KeyBundle,
    ) -> Result<VaultKeyRecord> {
        self.verifier.confirm_identity(identity, user_id).await?;
        self.check(BundlePath::Passphrase, &passphrase_bundle)?;
        self.check(BundlePath::Recovery, &recovery_bundle)?;

        let now = self.clock.now_millis();
        let record = VaultKeyRecord {
            user_id: user_id.clone(),
            auth_method,
            passphrase_bundle,
            recovery_bundle,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_vault_key(&record).await? {
            InsertResult::Inserted => {
                tracing::info!(user = %user_id, method = auth_method.as_str(), "vault key stored");
                Ok(record)
            }
            InsertResult::AlreadyExists => Err(GateError::AlreadyExists(format!(
                "vault key for {user_id}"
            ))),
        }
    }

    /// Fetch the record. Only the vault owner may read it.
    pub async fn get(&self, owner: &str, user_id: &UserId) -> Result<VaultKeyRecord> {
        self.verifier.confirm_owner(owner, user_id).await?;
        self.load(user_id).await
    }

    /// Replace the passphrase bundle, keeping the recovery bundle.
    pub async fn rotate_passphrase(
        &self,
        owner: &str,
        user_id: &UserId,
        bundle: KeyBundle,
    ) -> Result<VaultKeyRecord> {
        self.rotate(owner, user_id, BundlePath::Passphrase, bundle)
            .await
    }

    /// Replace the recovery bundle, keeping the passphrase bundle.
    pub async fn rotate_recovery(
        &self,
        owner: &str,
        user_id: &UserId,
        bundle: KeyBundle,
    ) -> Result<VaultKeyRecord> {
        self.rotate(owner, user_id, BundlePath::Recovery, bundle)
            .await
    }

    pub(crate) async fn erase(&self, user_id: &UserId) -> Result<bool> {
        let _rotation = self.rotation.lock().await;
        Ok(self.store.delete_vault_key(user_id).await?)
    }

    async fn rotate(
        &self,
        owner: &str,
        user_id: &UserId,
        path: BundlePath,
        bundle: KeyBundle,
    ) -> Result<VaultKeyRecord> {
        self.verifier.confirm_owner(owner, user_id).await?;
        self.check(path, &bundle)?;

        let _rotation = self.rotation.lock().await;
        let mut record = self.load(user_id).await?;
        match path {
            BundlePath::Passphrase => record.passphrase_bundle = bundle,
            BundlePath::Recovery => record.recovery_bundle = bundle,
        }
        record.updated_at = self.clock.now_millis();

        self.store.replace_vault_key(&record).await?;
        tracing::info!(user = %user_id, path = path.label(), "vault key rotated");
        Ok(record)
    }

    async fn load(&self, user_id: &UserId) -> Result<VaultKeyRecord> {
        self.store
            .get_vault_key(user_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("vault key for {user_id}")))
    }

    fn check(&self, path: BundlePath, bundle: &KeyBundle) -> Result<()> {
        bundle
            .validate(&self.policy)
            .map_err(|source| GateError::InvalidBundle { path, source })
    }
}
