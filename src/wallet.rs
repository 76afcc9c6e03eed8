//! Identity store: named RSA keypairs whose private halves are kept
//! encrypted under the owner's passphrase.

use crate::config::WalletConfig;
use crate::crypto::{public_key_from_pem, verify_signature, KdfParams, KeyPair, Keystore};
use crate::error::ChainError;
use crate::persistence::Persistence;
use std::sync::Arc;
use tracing::{info, warn};

/// A stored identity. The private key never leaves its encrypted form here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner: String,
    /// SubjectPublicKeyInfo PEM.
    pub public_key: String,
    /// JSON [`Keystore`] holding the PKCS#8 private key.
    pub encrypted_private_key: Vec<u8>,
}

pub struct WalletStore {
    persistence: Arc<dyn Persistence>,
    key_bits: usize,
    kdf: KdfParams,
}

impl WalletStore {
    pub fn new(persistence: Arc<dyn Persistence>, config: &WalletConfig) -> Self {
        WalletStore {
            persistence,
            key_bits: config.key_bits,
            kdf: KdfParams::from(config),
        }
    }

    /// Create an identity for `owner`, or return the existing one untouched.
    pub fn generate(&self, owner: &str, passphrase: &str) -> Result<Identity, ChainError> {
        if owner.trim().is_empty() {
            return Err(ChainError::InvalidIdentity(
                "Owner name must be non-empty".to_string(),
            ));
        }
        if let Some(existing) = self.persistence.get_wallet(owner)? {
            return Ok(existing);
        }

        let keypair = KeyPair::generate(self.key_bits)?;
        let keystore = Keystore::seal(&keypair.private_key_der()?, passphrase, self.kdf)?;
        let identity = Identity {
            owner: owner.to_string(),
            public_key: keypair.public_key_pem()?,
            encrypted_private_key: keystore.to_bytes()?,
        };

        match self.persistence.insert_wallet(&identity) {
            Ok(()) => {
                info!("Created identity for {}", owner);
                Ok(identity)
            }
            // Lost a race with another generate for the same owner.
            Err(ChainError::DuplicateIdentity(_)) => self.load(owner),
            Err(e) => Err(e),
        }
    }

    pub fn load(&self, owner: &str) -> Result<Identity, ChainError> {
        self.persistence
            .get_wallet(owner)?
            .ok_or_else(|| ChainError::IdentityNotFound(owner.to_string()))
    }

    /// Sign `message` with `owner`'s private key, unlocked by `passphrase`.
    pub fn sign(&self, owner: &str, message: &[u8], passphrase: &str) -> Result<Vec<u8>, ChainError> {
        let identity = self.load(owner)?;
        let keystore = Keystore::from_bytes(&identity.encrypted_private_key)?;
        let der = keystore.open(passphrase).map_err(|e| {
            if matches!(e, ChainError::WrongPassphrase) {
                warn!("Wrong passphrase for {}", owner);
            }
            e
        })?;
        KeyPair::from_pkcs8_der(&der)?.sign(message)
    }

    /// True only for a cryptographically valid signature by `owner`.
    ///
    /// Fails only when the owner is unknown or storage is unreadable.
    pub fn verify(&self, owner: &str, message: &[u8], signature: &[u8]) -> Result<bool, ChainError> {
        let identity = self.load(owner)?;
        let public_key = match public_key_from_pem(&identity.public_key) {
            Ok(key) => key,
            Err(e) => {
                warn!("Unusable public key for {}: {}", owner, e);
                return Ok(false);
            }
        };
        Ok(verify_signature(&public_key, message, signature))
    }

    /// Parsed public key of `owner`.
    pub fn public_key(&self, owner: &str) -> Result<rsa::RsaPublicKey, ChainError> {
        public_key_from_pem(&self.load(owner)?.public_key)
    }

    pub fn owners(&self) -> Result<Vec<String>, ChainError> {
        self.persistence.list_owners()
    }

    /// Administrative removal. Not part of the normal transaction flow.
    pub fn remove(&self, owner: &str) -> Result<bool, ChainError> {
        let removed = self.persistence.remove_wallet(owner)?;
        if removed {
            info!("Removed identity for {}", owner);
        }
        Ok(removed)
    }
}
