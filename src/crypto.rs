//! Cryptographic primitives for Dummycoin
//!
//! - RSA keypairs (PKCS#8 / SPKI encodings) with probabilistic PSS-SHA256 signatures
//! - A password keystore: Argon2id derives an AES-256-GCM key from the passphrase
//!   and a random salt, and the encrypted private key is serialized as JSON
//! - SHA-256 hex digests used by mining and block hashing

use crate::config::WalletConfig;
use crate::error::ChainError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const KEYSTORE_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;
const DERIVED_KEY_LEN: usize = 32;

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&WalletConfig> for KdfParams {
    fn from(config: &WalletConfig) -> Self {
        KdfParams {
            memory: config.kdf_memory_kib,
            iterations: config.kdf_iterations,
            parallelism: config.kdf_parallelism,
        }
    }
}

/// Serialized form of a passphrase-encrypted private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keystore {
    pub version: u32,
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Base64 salt.
    pub salt: String,
    /// Base64 nonce.
    pub nonce: String,
    /// Base64 ciphertext (includes the GCM tag).
    pub ciphertext: String,
}

impl Keystore {
    /// Encrypt `plaintext` under `passphrase` with a fresh salt and nonce.
    pub fn seal(plaintext: &[u8], passphrase: &str, params: KdfParams) -> Result<Self, ChainError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = derive_key(passphrase, &salt, params)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ChainError::CryptoError(format!("AES key init failed: {}", e)))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| ChainError::CryptoError(format!("Encryption failed: {}", e)))?;

        Ok(Keystore {
            version: KEYSTORE_VERSION,
            cipher: "aes-256-gcm".to_string(),
            kdf: "argon2id".to_string(),
            kdf_params: params,
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt with `passphrase`. Authentication failure means the passphrase is wrong.
    pub fn open(&self, passphrase: &str) -> Result<Vec<u8>, ChainError> {
        if self.version != KEYSTORE_VERSION {
            return Err(ChainError::CryptoError(format!(
                "Unsupported keystore version: {}",
                self.version
            )));
        }

        let salt = decode_field("salt", &self.salt)?;
        let nonce_bytes = decode_field("nonce", &self.nonce)?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(ChainError::CryptoError(format!(
                "Keystore nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce_bytes.len()
            )));
        }

        let key = derive_key(passphrase, &salt, self.kdf_params)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ChainError::CryptoError(format!("AES key init failed: {}", e)))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| ChainError::WrongPassphrase)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ChainError::CryptoError(format!("Invalid keystore: {}", e)))
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, ChainError> {
    BASE64
        .decode(value)
        .map_err(|e| ChainError::CryptoError(format!("Invalid keystore {}: {}", name, e)))
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<[u8; DERIVED_KEY_LEN], ChainError> {
    let params = Params::new(
        params.memory,
        params.iterations,
        params.parallelism,
        Some(DERIVED_KEY_LEN),
    )
    .map_err(|e| ChainError::CryptoError(format!("Argon2 params error: {}", e)))?;

    let mut output = [0u8; DERIVED_KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut output)
        .map_err(|e| ChainError::CryptoError(format!("Argon2 hashing failed: {}", e)))?;
    Ok(output)
}

/// An RSA keypair. The public exponent is 65537.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
}

impl KeyPair {
    /// Generates a new random keypair with a `bits`-bit modulus.
    pub fn generate(bits: usize) -> Result<Self, ChainError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ChainError::CryptoError(format!("RSA key generation failed: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, ChainError> {
        let private_key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| ChainError::CryptoError(format!("Invalid private key: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    pub fn private_key_der(&self) -> Result<Vec<u8>, ChainError> {
        let doc = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| ChainError::CryptoError(format!("Failed to encode private key: {}", e)))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// SubjectPublicKeyInfo PEM of the public half.
    pub fn public_key_pem(&self) -> Result<String, ChainError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ChainError::CryptoError(format!("Failed to encode public key: {}", e)))
    }

    /// PSS-SHA256 signature with a fresh random salt, so repeated calls differ.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ChainError> {
        let signing_key = BlindedSigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key
            .try_sign_with_rng(&mut OsRng, message)
            .map_err(|e| ChainError::CryptoError(format!("Signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, ChainError> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))
}

/// Verifies a PSS-SHA256 signature. Malformed signatures are simply invalid.
pub fn verify_signature(public_key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let signature = match Signature::try_from(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(message, &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST_KDF: KdfParams = KdfParams {
        memory: 8,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keystore_roundtrip_and_wrong_passphrase() {
        let keystore = Keystore::seal(b"secret material", "hunter2", FAST_KDF).unwrap();
        assert_eq!(keystore.open("hunter2").unwrap(), b"secret material");
        assert!(matches!(
            keystore.open("hunter3"),
            Err(ChainError::WrongPassphrase)
        ));
    }

    #[test]
    fn test_keystore_uses_fresh_salt() {
        let a = Keystore::seal(b"same", "pw", FAST_KDF).unwrap();
        let b = Keystore::seal(b"same", "pw", FAST_KDF).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_keystore_bytes() {
        let keystore = Keystore::seal(b"data", "pw", FAST_KDF).unwrap();
        let parsed = Keystore::from_bytes(&keystore.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.kdf_params, FAST_KDF);
        assert_eq!(parsed.open("pw").unwrap(), b"data");
        assert!(Keystore::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = KeyPair::generate(1024).unwrap();
        let message = b"alice sends 2 dummycoins to bob";

        let sig1 = keypair.sign(message).unwrap();
        let sig2 = keypair.sign(message).unwrap();
        assert_ne!(sig1, sig2);

        assert!(verify_signature(&keypair.public_key, message, &sig1));
        assert!(verify_signature(&keypair.public_key, message, &sig2));
        assert!(!verify_signature(&keypair.public_key, b"tampered", &sig1));

        let mut flipped = sig1.clone();
        flipped[10] ^= 0x01;
        assert!(!verify_signature(&keypair.public_key, message, &flipped));
        assert!(!verify_signature(&keypair.public_key, message, &sig1[1..]));
        assert!(!verify_signature(&keypair.public_key, message, &[]));
    }

    #[test]
    fn test_key_encodings() {
        let keypair = KeyPair::generate(1024).unwrap();
        let pem = keypair.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(public_key_from_pem(&pem).unwrap(), keypair.public_key);

        let restored = KeyPair::from_pkcs8_der(&keypair.private_key_der().unwrap()).unwrap();
        let sig = restored.sign(b"msg").unwrap();
        assert!(verify_signature(&keypair.public_key, b"msg", &sig));
        assert!(public_key_from_pem("garbage").is_err());
    }
}
