//! Core trait defining the nonce payment lifecycle interface.
//!
//! Implementors own the `Requested → NonceIssued → Verified → {Settled |
//! Failed | Expired}` state machine: issuing single-use nonces, verifying
//! client-signed authorization payloads, and committing settlements on-chain
//! exactly once.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{
    Address, NonceRecord, PaymentRequest, SettlementSignature, SplitPayment, StoreStats,
    TokenAmount,
};

/// Parameters for `POST /store-nonce`: what the resource server wants paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub amount: TokenAmount,
    pub recipient: Address,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub resource_url: String,
    #[serde(default)]
    pub split_payment: SplitPayment,
    /// Overrides the configured nonce TTL, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

/// Successful verification: the payload, signature, and split spec all check
/// out for this payer. Verification is not consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReceipt {
    pub nonce: String,
    pub payer: Address,
}

/// Successful settlement: the transfer is confirmed under this signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleReceipt {
    pub nonce: String,
    pub transaction_signature: SettlementSignature,
}

/// Result of one expiry-cleanup pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cleaned: usize,
}

/// Trait defining the asynchronous interface for nonce payment facilitators.
///
/// This interface is implemented by any type that issues payment nonces and
/// performs verification and settlement of the corresponding authorizations.
pub trait Facilitator {
    /// The error type returned by this facilitator.
    type Error: Debug + Display;

    /// Issues a fresh single-use nonce bound to an amount and recipient set.
    ///
    /// # Errors
    ///
    /// Fails only when the issuance parameters violate the configured payment
    /// policy, or on a storage fault.
    fn issue_nonce(
        &self,
        request: IssueRequest,
    ) -> impl Future<Output = Result<NonceRecord, Self::Error>> + Send;

    /// Verifies a client-signed [`PaymentRequest`] against the issued nonce.
    ///
    /// Guard failures leave the record claimable; re-verification is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the nonce is unknown or expired, the
    /// signature does not verify, or the split spec violates the fee policy.
    fn verify(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<VerifyReceipt, Self::Error>> + Send;

    /// Settles a verified payment on the ledger, exactly once per nonce.
    ///
    /// Runs the full verification guard set itself: `verify` and `settle` are
    /// independent HTTP calls with no shared transaction boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] on any guard or ledger failure. Every attempt,
    /// success or failure, lands in the audit log before this returns.
    fn settle(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<SettleReceipt, Self::Error>> + Send;

    /// Looks up one nonce record.
    fn nonce(
        &self,
        nonce: &str,
    ) -> impl Future<Output = Result<Option<NonceRecord>, Self::Error>> + Send;

    /// Aggregate store counters.
    fn stats(&self) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send;

    /// Sweeps expired, unsettled records.
    fn cleanup(&self) -> impl Future<Output = Result<CleanupReport, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn issue_nonce(
        &self,
        request: IssueRequest,
    ) -> impl Future<Output = Result<NonceRecord, Self::Error>> + Send {
        self.as_ref().issue_nonce(request)
    }

    fn verify(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<VerifyReceipt, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<SettleReceipt, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn nonce(
        &self,
        nonce: &str,
    ) -> impl Future<Output = Result<Option<NonceRecord>, Self::Error>> + Send {
        self.as_ref().nonce(nonce)
    }

    fn stats(&self) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send {
        self.as_ref().stats()
    }

    fn cleanup(&self) -> impl Future<Output = Result<CleanupReport, Self::Error>> + Send {
        self.as_ref().cleanup()
    }
}
