//! Error types for Dummycoin

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// An identity with this owner name already exists.
    #[error("Identity already exists: {0}")]
    DuplicateIdentity(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("No verified transactions to mine")]
    EmptyMiningSet,

    #[error("Mining cancelled")]
    MiningCancelled,

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// A stored row did not have the shape its record type expects.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::StorageFailure(err.to_string())
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
