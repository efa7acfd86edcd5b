//! Durable keyed state for issued nonces.
//!
//! The store is the single source of truth for "has this authorization been
//! consumed". The settlement claim is a first-class conditional update
//! ([`NonceStore::claim_settlement`]): set the transaction signature only if
//! it is currently unset. Callers never get a read-then-write path to the
//! signature column, so two racing settlement attempts cannot both win.

mod memory;
mod sqlite;

pub use memory::InMemoryNonceStore;
pub use sqlite::SqliteNonceStore;

use rand::RngCore;

use crate::timestamp::UnixTimestamp;
use crate::types::{
    Address, NonceRecord, SettlementSignature, SplitPayment, StoreStats, TokenAmount,
    TransactionRecord,
};

/// Bounded regeneration budget before issuance gives up on a colliding nonce.
pub(crate) const MAX_CREATE_ATTEMPTS: u32 = 8;

/// Storage-layer failures. Transient infra category, distinct from domain
/// outcomes like [`ClaimOutcome::AlreadySettled`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Fresh-nonce generation kept colliding; the store never silently
    /// returns a colliding nonce.
    #[error("nonce generation exhausted {0} attempts")]
    NonceCollision(u32),
    /// Backend fault (connection, disk, poisoned lock).
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Result of the atomic settlement claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller won the claim; it alone may submit to the ledger.
    Claimed,
    /// Another attempt already holds (or completed) the claim.
    AlreadySettled,
    NotFound,
    Expired,
}

/// Parameters for issuing one nonce.
#[derive(Debug, Clone)]
pub struct IssueParams {
    pub amount: TokenAmount,
    pub recipient: Address,
    pub resource_id: String,
    pub resource_url: String,
    pub split_payment: SplitPayment,
    pub expiry: UnixTimestamp,
    pub created_at: UnixTimestamp,
}

/// Keyed nonce state plus the append-only settlement audit log.
///
/// Implementations must make [`claim_settlement`](NonceStore::claim_settlement)
/// a single conditional update, not a read-then-write pair: two settlement
/// requests for the same nonce may race, and exactly one may observe
/// [`ClaimOutcome::Claimed`].
pub trait NonceStore: Send + Sync {
    /// Issues a fresh unique nonce. Fails with [`StoreError::NonceCollision`]
    /// if regeneration exceeds the bounded retry budget.
    fn create(&self, params: IssueParams) -> Result<NonceRecord, StoreError>;

    fn get(&self, nonce: &str) -> Result<Option<NonceRecord>, StoreError>;

    /// Records a successful verification and the client key that proved it.
    /// Verification is not consumption: repeat calls are allowed and the
    /// record stays claimable.
    fn mark_verified(&self, nonce: &str, client_key: &Address) -> Result<(), StoreError>;

    /// The atomic settlement claim: sets `transaction_signature` if and only
    /// if it is currently unset and the record is not expired at `now`.
    fn claim_settlement(
        &self,
        nonce: &str,
        signature: &SettlementSignature,
        now: UnixTimestamp,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Demotes a claimed record to `Failed` after a post-claim settlement
    /// failure. The settlement signature is retained: the None→Some
    /// transition happens at most once per nonce.
    fn mark_failed(&self, nonce: &str) -> Result<(), StoreError>;

    /// Appends one settlement-attempt audit row. Persistence failures are
    /// logged, never propagated: the audit trail must not fail the caller's
    /// settlement flow.
    fn record_attempt(&self, attempt: &TransactionRecord);

    /// Removes unsettled, unclaimed records whose expiry has passed. Settled
    /// and failed records are retained for audit.
    fn sweep_expired(&self, now: UnixTimestamp) -> Result<usize, StoreError>;

    fn stats(&self, now: UnixTimestamp) -> Result<StoreStats, StoreError>;
}

/// 32 bytes of OS entropy, base58. High enough entropy that a collision in
/// practice indicates a broken RNG, which the bounded retry surfaces.
pub(crate) fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bs58::encode(bytes).into_string()
}
