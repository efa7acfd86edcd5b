//! Ledger client interface for settlement.
//!
//! The facilitator consumes the ledger through a capability set — check
//! funds, co-sign and prepare a transfer, submit and await confirmation —
//! injected at construction. Production ([`SolanaLedger`]) and simulation
//! ([`SimulatedLedger`]) are two implementations of the same interface,
//! selected once at startup from configuration, never per call.

mod simulated;
mod solana;

pub use simulated::SimulatedLedger;
pub use solana::SolanaLedger;

use async_trait::async_trait;
use solana_transaction::versioned::VersionedTransaction;

use crate::types::{Address, SettlementSignature, TokenAmount};

/// Ledger-facing failures during settlement.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Settlement needs the payer-signed transfer; none was supplied.
    #[error("signed transfer is required for settlement")]
    MissingTransaction,
    /// The signed transfer bytes did not decode into a transaction.
    #[error("failed to decode signed transfer: {0}")]
    Decoding(String),
    /// The fee payer has no signer slot in the transfer's message.
    #[error("fee payer is not among the transfer's required signers")]
    MissingFeePayerSlot,
    /// Required signatures are missing after co-signing.
    #[error("transfer is not fully signed")]
    Undersigned,
    /// Co-signing failed.
    #[error("signing failed: {0}")]
    Signing(String),
    /// The payer's balance cannot cover the transfer.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: TokenAmount,
        available: TokenAmount,
    },
    /// The ledger processed and rejected the transfer.
    #[error("ledger rejected the transfer: {0}")]
    Rejected(String),
    /// RPC transport failure before or during confirmation.
    #[error("rpc transport failure: {0}")]
    Transport(String),
}

/// A transfer about to be settled on behalf of `payer`.
#[derive(Debug, Clone, Copy)]
pub struct TransferIntent<'a> {
    pub nonce: &'a str,
    pub payer: &'a Address,
    pub amount: TokenAmount,
    /// Base64 bincode-encoded transaction, already signed by the payer.
    pub signed_transaction: Option<&'a str>,
}

/// A transfer that cleared preparation: fully signed, settlement signature
/// known, ready to submit. The signature is available *before* submission so
/// the nonce claim can land first.
pub struct PreparedTransfer {
    signature: SettlementSignature,
    kind: PreparedKind,
}

enum PreparedKind {
    Simulated,
    Chain(Box<VersionedTransaction>),
}

impl PreparedTransfer {
    pub(crate) fn simulated(signature: SettlementSignature) -> Self {
        Self {
            signature,
            kind: PreparedKind::Simulated,
        }
    }

    pub(crate) fn chain(signature: SettlementSignature, transaction: VersionedTransaction) -> Self {
        Self {
            signature,
            kind: PreparedKind::Chain(Box::new(transaction)),
        }
    }

    /// The signature that will identify this settlement once committed.
    pub fn signature(&self) -> &SettlementSignature {
        &self.signature
    }

    pub(crate) fn into_parts(self) -> (SettlementSignature, Option<VersionedTransaction>) {
        match self.kind {
            PreparedKind::Simulated => (self.signature, None),
            PreparedKind::Chain(tx) => (self.signature, Some(*tx)),
        }
    }
}

/// The capability set the settlement path needs from a ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The facilitator's fee-payer address, if this ledger sponsors fees.
    fn fee_payer(&self) -> Option<Address>;

    /// Fails fast with [`LedgerError::InsufficientFunds`] when the payer
    /// cannot cover `required`. The simulated ledger performs no check.
    async fn ensure_funds(&self, payer: &Address, required: TokenAmount)
    -> Result<(), LedgerError>;

    /// Validates and co-signs the transfer, returning it submission-ready
    /// with its settlement signature. Never mutates the payer's intent.
    fn prepare(&self, intent: &TransferIntent<'_>) -> Result<PreparedTransfer, LedgerError>;

    /// Submits the prepared transfer and waits for ledger confirmation.
    /// Unbounded; callers bound it with their own timeout.
    async fn submit(&self, transfer: PreparedTransfer) -> Result<SettlementSignature, LedgerError>;
}
