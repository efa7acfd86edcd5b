//! Settlement execution: balance gate, submission, bounded confirmation.
//!
//! `prepare` and `submit` are deliberately separate so the lifecycle can run
//! the nonce claim between them: the settlement signature is known after
//! `prepare`, the claim lands, and only the claim winner ever calls `submit`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PaymentError;
use crate::ledger::{LedgerClient, LedgerError, PreparedTransfer, TransferIntent};
use crate::types::{Address, SettlementSignature, TokenAmount};

pub struct SettlementExecutor {
    ledger: Arc<dyn LedgerClient>,
    confirm_timeout: Duration,
}

impl SettlementExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>, confirm_timeout: Duration) -> Self {
        Self {
            ledger,
            confirm_timeout,
        }
    }

    pub fn fee_payer(&self) -> Option<Address> {
        self.ledger.fee_payer()
    }

    /// Validates and co-signs the transfer. No ledger mutation happens here.
    pub fn prepare(&self, intent: &TransferIntent<'_>) -> Result<PreparedTransfer, PaymentError> {
        self.ledger.prepare(intent).map_err(map_ledger_error)
    }

    /// Fails fast with `InsufficientFunds` instead of submitting a transfer
    /// destined to fail on-chain.
    pub async fn ensure_funds(
        &self,
        payer: &Address,
        required: TokenAmount,
    ) -> Result<(), PaymentError> {
        self.ledger
            .ensure_funds(payer, required)
            .await
            .map_err(map_ledger_error)
    }

    /// Submits and awaits confirmation, bounded by the configured timeout.
    pub async fn submit(
        &self,
        transfer: PreparedTransfer,
    ) -> Result<SettlementSignature, PaymentError> {
        match tokio::time::timeout(self.confirm_timeout, self.ledger.submit(transfer)).await {
            Ok(result) => result.map_err(map_ledger_error),
            Err(_) => Err(PaymentError::ConfirmationTimeout),
        }
    }
}

fn map_ledger_error(error: LedgerError) -> PaymentError {
    match error {
        LedgerError::MissingTransaction
        | LedgerError::Decoding(_)
        | LedgerError::MissingFeePayerSlot
        | LedgerError::Undersigned => PaymentError::Validation(error.to_string()),
        LedgerError::InsufficientFunds {
            required,
            available,
        } => PaymentError::InsufficientFunds {
            required,
            available,
        },
        LedgerError::Signing(_) | LedgerError::Rejected(_) | LedgerError::Transport(_) => {
            PaymentError::Submission(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SimulatedLedger;
    use async_trait::async_trait;
    use solana_pubkey::Pubkey;

    /// Ledger whose confirmation never arrives.
    struct StalledLedger;

    #[async_trait]
    impl LedgerClient for StalledLedger {
        fn fee_payer(&self) -> Option<Address> {
            None
        }

        async fn ensure_funds(
            &self,
            _payer: &Address,
            _required: TokenAmount,
        ) -> Result<(), LedgerError> {
            Ok(())
        }

        fn prepare(&self, _intent: &TransferIntent<'_>) -> Result<PreparedTransfer, LedgerError> {
            Ok(PreparedTransfer::simulated(SettlementSignature::new(
                "stalled",
            )))
        }

        async fn submit(
            &self,
            _transfer: PreparedTransfer,
        ) -> Result<SettlementSignature, LedgerError> {
            std::future::pending().await
        }
    }

    fn payer() -> Address {
        Address::new(Pubkey::new_from_array([9; 32]))
    }

    #[tokio::test]
    async fn test_simulated_settlement_completes() {
        let executor = SettlementExecutor::new(
            Arc::new(SimulatedLedger::new()),
            Duration::from_secs(5),
        );
        let payer = payer();
        let intent = TransferIntent {
            nonce: "n-1",
            payer: &payer,
            amount: TokenAmount::new(100),
            signed_transaction: None,
        };
        let prepared = executor.prepare(&intent).unwrap();
        let expected = prepared.signature().clone();
        let signature = executor.submit(prepared).await.unwrap();
        assert_eq!(signature, expected);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_maps_to_payment_error() {
        let executor =
            SettlementExecutor::new(Arc::new(StalledLedger), Duration::from_millis(20));
        let payer = payer();
        let intent = TransferIntent {
            nonce: "n-1",
            payer: &payer,
            amount: TokenAmount::new(100),
            signed_transaction: None,
        };
        let prepared = executor.prepare(&intent).unwrap();
        let result = executor.submit(prepared).await;
        assert!(matches!(result, Err(PaymentError::ConfirmationTimeout)));
    }
}
