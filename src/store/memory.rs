//! In-memory nonce store over [`DashMap`].
//!
//! Backs tests and explicitly-ephemeral deployments. The settlement claim
//! mutates the record while holding the map's shard entry lock, which gives
//! the same one-winner guarantee as the SQLite conditional update: concurrent
//! claims serialize on the entry, and only the one that observes an unset
//! signature may set it.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::{ClaimOutcome, IssueParams, MAX_CREATE_ATTEMPTS, NonceStore, StoreError};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    Address, NonceRecord, NonceStatus, SettlementSignature, StoreStats, TransactionRecord,
};

/// Ephemeral [`NonceStore`]; nothing survives a restart.
#[derive(Default)]
pub struct InMemoryNonceStore {
    records: DashMap<String, NonceRecord>,
    attempts: Mutex<Vec<TransactionRecord>>,
    total_issued: AtomicU64,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit rows for one nonce, oldest first.
    pub fn attempts(&self, nonce: &str) -> Vec<TransactionRecord> {
        self.attempts
            .lock()
            .map(|attempts| {
                attempts
                    .iter()
                    .filter(|a| a.nonce == nonce)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn create(&self, params: IssueParams) -> Result<NonceRecord, StoreError> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let nonce = super::generate_nonce();
            match self.records.entry(nonce.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(vacant) => {
                    let record = NonceRecord {
                        nonce,
                        amount: params.amount,
                        client_public_key: None,
                        recipient: params.recipient,
                        resource_id: params.resource_id.clone(),
                        resource_url: params.resource_url.clone(),
                        expiry: params.expiry,
                        split_payment: params.split_payment.clone(),
                        transaction_signature: None,
                        status: NonceStatus::Pending,
                        created_at: params.created_at,
                    };
                    vacant.insert(record.clone());
                    self.total_issued.fetch_add(1, Ordering::Relaxed);
                    return Ok(record);
                }
            }
        }
        Err(StoreError::NonceCollision(MAX_CREATE_ATTEMPTS))
    }

    fn get(&self, nonce: &str) -> Result<Option<NonceRecord>, StoreError> {
        Ok(self.records.get(nonce).map(|r| r.clone()))
    }

    fn mark_verified(&self, nonce: &str, client_key: &Address) -> Result<(), StoreError> {
        if let Some(mut record) = self.records.get_mut(nonce)
            && record.transaction_signature.is_none()
            && matches!(record.status, NonceStatus::Pending | NonceStatus::Verified)
        {
            record.status = NonceStatus::Verified;
            record.client_public_key = Some(*client_key);
        }
        Ok(())
    }

    fn claim_settlement(
        &self,
        nonce: &str,
        signature: &SettlementSignature,
        now: UnixTimestamp,
    ) -> Result<ClaimOutcome, StoreError> {
        // Mutation happens under the shard entry lock: the check and the set
        // are one critical section.
        let Some(mut record) = self.records.get_mut(nonce) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if record.transaction_signature.is_some() {
            return Ok(ClaimOutcome::AlreadySettled);
        }
        if record.expiry.is_past(now) {
            return Ok(ClaimOutcome::Expired);
        }
        record.transaction_signature = Some(signature.clone());
        record.status = NonceStatus::Settled;
        Ok(ClaimOutcome::Claimed)
    }

    fn mark_failed(&self, nonce: &str) -> Result<(), StoreError> {
        if let Some(mut record) = self.records.get_mut(nonce) {
            record.status = NonceStatus::Failed;
        }
        Ok(())
    }

    fn record_attempt(&self, attempt: &TransactionRecord) {
        match self.attempts.lock() {
            Ok(mut attempts) => attempts.push(attempt.clone()),
            Err(e) => {
                tracing::error!(nonce = %attempt.nonce, error = %e, "failed to persist settlement attempt")
            }
        }
    }

    fn sweep_expired(&self, now: UnixTimestamp) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| {
            let removable = record.transaction_signature.is_none()
                && matches!(record.status, NonceStatus::Pending | NonceStatus::Verified)
                && record.expiry.is_past(now);
            !removable
        });
        Ok(before - self.records.len())
    }

    fn stats(&self, now: UnixTimestamp) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats {
            total_issued: self.total_issued.load(Ordering::Relaxed),
            settled: 0,
            failed: 0,
            pending: 0,
            expired: 0,
        };
        for record in self.records.iter() {
            match record.status_at(now) {
                NonceStatus::Settled => stats.settled += 1,
                NonceStatus::Failed => stats.failed += 1,
                NonceStatus::Expired => stats.expired += 1,
                NonceStatus::Pending | NonceStatus::Verified => stats.pending += 1,
            }
        }
        Ok(stats)
    }
}
