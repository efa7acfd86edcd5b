//! Periodic expiry sweep, decoupled from request handling.
//!
//! The sweep removes only unsettled, unclaimed, expired records, and the
//! settlement claim refuses expired records, so the two paths never contend
//! over the same row: their predicates are disjoint by construction.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::PaymentError;
use crate::facilitator::Facilitator;

pub struct ExpirySweeper<F> {
    facilitator: F,
    interval: Duration,
}

impl<F> ExpirySweeper<F>
where
    F: Facilitator<Error = PaymentError> + Send + Sync + 'static,
{
    pub fn new(facilitator: F, interval: Duration) -> Self {
        Self {
            facilitator,
            interval,
        }
    }

    /// Runs until cancelled. The first sweep fires immediately, clearing
    /// records that expired while the process was down.
    pub async fn run(self, cancellation_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.facilitator.cleanup().await {
                        tracing::warn!(error = %error, "expiry sweep failed");
                    }
                }
                _ = cancellation_token.cancelled() => {
                    tracing::debug!("expiry sweeper stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeePolicy;
    use crate::facilitator::IssueRequest;
    use crate::ledger::SimulatedLedger;
    use crate::lifecycle::PaymentLifecycle;
    use crate::settlement::SettlementExecutor;
    use crate::split::SplitValidator;
    use crate::store::{InMemoryNonceStore, NonceStore};
    use crate::types::{Address, SplitPayment, TokenAmount};
    use rust_decimal::Decimal;
    use solana_pubkey::Pubkey;
    use std::str::FromStr;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweeper_removes_expired_and_stops_on_cancel() {
        let validator = SplitValidator::new(
            Address::new(Pubkey::new_from_array([0xFE; 32])),
            FeePolicy::Percent {
                percent: Decimal::from_str("0.4").unwrap(),
            },
        );
        let executor = SettlementExecutor::new(
            Arc::new(SimulatedLedger::new()),
            Duration::from_secs(5),
        );
        let lifecycle = Arc::new(PaymentLifecycle::new(
            InMemoryNonceStore::new(),
            executor,
            validator,
            300,
        ));
        let record = lifecycle
            .issue_nonce(IssueRequest {
                amount: TokenAmount::new(1_000),
                recipient: Address::new(Pubkey::new_from_array([0x01; 32])),
                resource_id: String::new(),
                resource_url: String::new(),
                split_payment: SplitPayment::Disabled,
                ttl_secs: Some(0),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let token = CancellationToken::new();
        let sweeper = ExpirySweeper::new(Arc::clone(&lifecycle), Duration::from_secs(3600));
        let handle = tokio::spawn(sweeper.run(token.clone()));

        // First tick is immediate
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(lifecycle.store().get(&record.nonce).unwrap().is_none());

        token.cancel();
        handle.await.unwrap();
    }
}
