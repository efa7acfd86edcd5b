//! Sponsored settlement over a Solana RPC endpoint.
//!
//! The client signs a transfer moving value; the facilitator appends its own
//! signature as fee payer and submits the fully-signed transaction. The payer
//! intent is never re-derived or mutated, only co-signed.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::ledger::{LedgerClient, LedgerError, PreparedTransfer, TransferIntent};
use crate::types::{Address, SettlementSignature, TokenAmount};

/// Poll spacing for the confirmation loop.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct SolanaLedger {
    keypair: Arc<Keypair>,
    rpc_client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl Debug for SolanaLedger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaLedger")
            .field("fee_payer", &self.keypair.pubkey())
            .field("rpc_url", &self.rpc_client.url())
            .finish()
    }
}

impl SolanaLedger {
    pub fn new(keypair: Keypair, rpc_url: String) -> Self {
        let ledger = Self {
            keypair: Arc::new(keypair),
            rpc_client: Arc::new(RpcClient::new(rpc_url)),
            commitment: CommitmentConfig::confirmed(),
        };
        tracing::info!(
            fee_payer = %ledger.keypair.pubkey(),
            rpc = %ledger.rpc_client.url(),
            "Initialized Solana ledger"
        );
        ledger
    }

    pub fn from_base58_signer(signer: &str, rpc_url: String) -> Self {
        let keypair = Keypair::from_base58_string(signer);
        Self::new(keypair, rpc_url)
    }

    /// Places this ledger's signature into the transaction at the fee payer's
    /// signer position. Other signatures are left untouched.
    fn co_sign(&self, tx: &VersionedTransaction) -> Result<VersionedTransaction, LedgerError> {
        let mut tx = tx.clone();
        let msg_bytes = tx.message.serialize();
        let signature = self
            .keypair
            .try_sign_message(msg_bytes.as_slice())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        // Required signatures are the first N account keys
        let num_required = tx.message.header().num_required_signatures as usize;
        let static_keys = tx.message.static_account_keys();
        let pos = static_keys[..num_required.min(static_keys.len())]
            .iter()
            .position(|k| *k == self.keypair.pubkey())
            .ok_or(LedgerError::MissingFeePayerSlot)?;
        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[pos] = signature;
        Ok(tx)
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, LedgerError> {
        self.rpc_client
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))
    }

    async fn confirm(&self, signature: &Signature) -> Result<(), LedgerError> {
        loop {
            let confirmed = self
                .rpc_client
                .confirm_transaction_with_commitment(signature, self.commitment)
                .await
                .map_err(|e| LedgerError::Transport(e.to_string()))?;
            if confirmed.value {
                return Ok(());
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

fn is_fully_signed(tx: &VersionedTransaction) -> bool {
    let num_required = tx.message.header().num_required_signatures as usize;
    tx.signatures.len() >= num_required
        && tx.signatures[..num_required]
            .iter()
            .all(|s| *s != Signature::default())
}

#[async_trait]
impl LedgerClient for SolanaLedger {
    fn fee_payer(&self) -> Option<Address> {
        Some(Address::new(self.keypair.pubkey()))
    }

    async fn ensure_funds(
        &self,
        payer: &Address,
        required: TokenAmount,
    ) -> Result<(), LedgerError> {
        let available = self
            .rpc_client
            .get_balance(payer.pubkey())
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        let available = TokenAmount::new(available);
        if available < required {
            return Err(LedgerError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }

    fn prepare(&self, intent: &TransferIntent<'_>) -> Result<PreparedTransfer, LedgerError> {
        let encoded = intent
            .signed_transaction
            .ok_or(LedgerError::MissingTransaction)?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| LedgerError::Decoding(e.to_string()))?;
        let transaction = bincode::deserialize::<VersionedTransaction>(bytes.as_slice())
            .map_err(|e| LedgerError::Decoding(e.to_string()))?;

        let transaction = self.co_sign(&transaction)?;
        if !is_fully_signed(&transaction) {
            return Err(LedgerError::Undersigned);
        }
        // Transaction id = first signature, known before submission
        let signature = transaction
            .signatures
            .first()
            .copied()
            .filter(|s| *s != Signature::default())
            .ok_or(LedgerError::Undersigned)?;
        Ok(PreparedTransfer::chain(
            SettlementSignature::new(signature.to_string()),
            transaction,
        ))
    }

    async fn submit(&self, transfer: PreparedTransfer) -> Result<SettlementSignature, LedgerError> {
        let (settlement_signature, transaction) = transfer.into_parts();
        let transaction = transaction.ok_or(LedgerError::MissingTransaction)?;
        let tx_signature = self.send(&transaction).await?;
        self.confirm(&tx_signature).await?;
        tracing::info!(signature = %tx_signature, "transfer confirmed");
        Ok(settlement_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_message::{Message, VersionedMessage};
    use solana_pubkey::Pubkey;

    fn unsigned_transaction(fee_payer: &Pubkey) -> VersionedTransaction {
        let message = Message::new(&[], Some(fee_payer));
        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        }
    }

    fn test_ledger() -> SolanaLedger {
        SolanaLedger::new(Keypair::new(), "http://localhost:8899".to_string())
    }

    #[test]
    fn test_co_sign_places_verifying_signature() {
        let ledger = test_ledger();
        let fee_payer = ledger.fee_payer().unwrap();
        let tx = unsigned_transaction(fee_payer.pubkey());
        assert!(!is_fully_signed(&tx));

        let signed = ledger.co_sign(&tx).unwrap();
        assert!(is_fully_signed(&signed));
        let msg_bytes = signed.message.serialize();
        assert!(signed.signatures[0].verify(fee_payer.as_ref(), &msg_bytes));
    }

    #[test]
    fn test_co_sign_requires_fee_payer_slot() {
        let ledger = test_ledger();
        let foreign = Keypair::new();
        let tx = unsigned_transaction(&foreign.pubkey());
        assert!(matches!(
            ledger.co_sign(&tx),
            Err(LedgerError::MissingFeePayerSlot)
        ));
    }

    #[test]
    fn test_prepare_requires_signed_transaction() {
        let ledger = test_ledger();
        let payer = Address::new(Keypair::new().pubkey());
        let intent = TransferIntent {
            nonce: "n",
            payer: &payer,
            amount: TokenAmount::new(1),
            signed_transaction: None,
        };
        assert!(matches!(
            ledger.prepare(&intent),
            Err(LedgerError::MissingTransaction)
        ));
    }

    #[test]
    fn test_prepare_rejects_garbage_bytes() {
        let ledger = test_ledger();
        let payer = Address::new(Keypair::new().pubkey());
        let intent = TransferIntent {
            nonce: "n",
            payer: &payer,
            amount: TokenAmount::new(1),
            signed_transaction: Some("not-base64-!!!"),
        };
        assert!(matches!(
            ledger.prepare(&intent),
            Err(LedgerError::Decoding(_))
        ));
    }
}
