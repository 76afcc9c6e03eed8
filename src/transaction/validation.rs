/// Validation logic for transactions separated from type definitions
use crate::crypto::verify_signature;
use crate::error::ChainError;
use crate::transaction::types::{PendingTx, VerifiedTx};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::RsaPublicKey;

/// Stateless checks on a transfer before it is signed.
pub fn validate_transfer(sender: &str, receiver: &str, amount: f64) -> Result<(), ChainError> {
    if sender.trim().is_empty() || receiver.trim().is_empty() {
        return Err(ChainError::InvalidTransaction(
            "Sender and receiver must be non-empty".to_string(),
        ));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ChainError::InvalidTransaction(format!(
            "Amount must be a positive number, got {}",
            amount
        )));
    }
    Ok(())
}

impl PendingTx {
    /// Checks the signature over the canonical message against `public_key`.
    ///
    /// A signature that is not valid base64 is just an invalid signature.
    pub fn validate_signature(&self, public_key: &RsaPublicKey) -> Result<(), ChainError> {
        let signature = BASE64
            .decode(&self.signature)
            .map_err(|_| ChainError::InvalidSignature)?;
        if verify_signature(public_key, self.message().as_bytes(), &signature) {
            Ok(())
        } else {
            Err(ChainError::InvalidSignature)
        }
    }

    /// Promote to a verified transaction stamped with `verified_time`.
    pub fn verify(self, public_key: &RsaPublicKey, verified_time: u64) -> Result<VerifiedTx, ChainError> {
        self.validate_signature(public_key)?;
        Ok(VerifiedTx {
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            submitted_time: self.submitted_time,
            verified_time,
        })
    }
}
