//! Error taxonomy for the payment lifecycle.
//!
//! Domain errors are terminal for their request and serialized into the wire
//! envelope by a single boundary in [`crate::handlers`]. [`PaymentError::Storage`]
//! is the one transient infra category and the only one that maps to HTTP 500.

use crate::split::SplitMismatch;
use crate::store::StoreError;
use crate::types::TokenAmount;

/// Everything that can go wrong between nonce issuance and settlement.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The request itself is malformed (missing signed transfer, bad issuance
    /// params, payload inconsistent with the issued nonce).
    #[error("Invalid request: {0}")]
    Validation(String),
    /// No record exists for the presented nonce.
    #[error("Unknown nonce")]
    NotFound,
    /// The nonce's expiry has passed; terminal regardless of signature validity.
    #[error("Nonce expired")]
    Expired,
    /// The nonce has already been claimed by a settlement attempt.
    #[error("Nonce already settled")]
    AlreadySettled,
    /// The detached signature does not verify over the payload for the claimed key.
    #[error("Invalid payload signature")]
    SignatureInvalid,
    /// The split spec violates the configured revenue-share policy.
    #[error("Split payment mismatch: {0}")]
    SplitMismatch(#[from] SplitMismatch),
    /// The payer's ledger balance cannot cover the transfer.
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: TokenAmount,
        available: TokenAmount,
    },
    /// The ledger rejected the submission.
    #[error("Submission failed: {0}")]
    Submission(String),
    /// Confirmation did not arrive within the configured window.
    #[error("Confirmation timed out")]
    ConfirmationTimeout,
    /// Transient storage-layer fault; retryable with the same nonce.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl PaymentError {
    /// True for the transient infra category (wire: HTTP 500).
    pub fn is_storage(&self) -> bool {
        matches!(self, PaymentError::Storage(_))
    }
}
