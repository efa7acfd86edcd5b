//! Reference [`Facilitator`] implementation: the nonce payment state machine.
//!
//! One record moves `Pending → Verified → {Settled | Failed | Expired}`. The
//! transitions with correctness hazards all funnel through here:
//!
//! - Settlement claims the nonce through the store's conditional update
//!   *before* the ledger sees the transfer, so two racing `/settle` calls
//!   resolve to one submission and one `AlreadySettled`.
//! - Failures before the claim leave the record untouched; the same
//!   still-valid nonce may retry. Failures after the claim demote the record
//!   to `Failed` with its settlement signature retained, so the nonce can
//!   never be resubmitted.
//! - Every settlement attempt is written to the audit log before the caller
//!   sees a response.

use tracing::instrument;

use crate::error::PaymentError;
use crate::facilitator::{CleanupReport, Facilitator, IssueRequest, SettleReceipt, VerifyReceipt};
use crate::ledger::TransferIntent;
use crate::settlement::SettlementExecutor;
use crate::signature::verify_detached;
use crate::split::SplitValidator;
use crate::store::{ClaimOutcome, IssueParams, NonceStore};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    Address, AttemptStatus, AuthorizationPayload, NonceRecord, PaymentRequest,
    SettlementSignature, StoreStats, TokenAmount, TransactionRecord,
};

pub struct PaymentLifecycle<S> {
    store: S,
    executor: SettlementExecutor,
    validator: SplitValidator,
    nonce_ttl_secs: u64,
}

impl<S> PaymentLifecycle<S>
where
    S: NonceStore,
{
    pub fn new(
        store: S,
        executor: SettlementExecutor,
        validator: SplitValidator,
        nonce_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            executor,
            validator,
            nonce_ttl_secs,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The fee payer sponsoring settlements, when the ledger has one.
    pub fn fee_payer(&self) -> Option<Address> {
        self.executor.fee_payer()
    }

    /// Full guard set shared by `verify` and `settle`: record exists, is
    /// unclaimed and unexpired, the payload matches what was issued, the
    /// signature proves the payer, and the split spec satisfies the policy.
    fn assert_spendable(
        &self,
        request: &PaymentRequest,
        now: UnixTimestamp,
    ) -> Result<NonceRecord, PaymentError> {
        let record = self
            .store
            .get(&request.payload.nonce)?
            .ok_or(PaymentError::NotFound)?;
        if record.transaction_signature.is_some() {
            return Err(PaymentError::AlreadySettled);
        }
        if record.expiry.is_past(now) {
            return Err(PaymentError::Expired);
        }
        assert_payload_matches(&record, &request.payload)?;
        if !verify_detached(
            &request.payload.signing_bytes(),
            &request.signature,
            &request.client_public_key,
        ) {
            return Err(PaymentError::SignatureInvalid);
        }
        self.validator
            .validate(&record.split_payment, record.amount, &record.recipient)?;
        Ok(record)
    }

    fn record_attempt(
        &self,
        nonce: &str,
        signature: Option<SettlementSignature>,
        error: Option<&PaymentError>,
    ) {
        let status = if error.is_none() {
            AttemptStatus::Confirmed
        } else {
            AttemptStatus::Failed
        };
        self.store.record_attempt(&TransactionRecord {
            nonce: nonce.to_string(),
            transaction_signature: signature,
            status,
            error_message: error.map(|e| e.to_string()),
            timestamp: UnixTimestamp::now(),
        });
    }
}

/// The signed payload must be byte-equivalent to what issuance returned; a
/// client cannot re-negotiate amount or recipients by editing its copy.
fn assert_payload_matches(
    record: &NonceRecord,
    payload: &AuthorizationPayload,
) -> Result<(), PaymentError> {
    if *payload == record.authorization_payload() {
        Ok(())
    } else {
        Err(PaymentError::Validation(
            "payload does not match the issued nonce".to_string(),
        ))
    }
}

impl<S> Facilitator for PaymentLifecycle<S>
where
    S: NonceStore,
{
    type Error = PaymentError;

    #[instrument(skip_all, err, fields(amount = %request.amount, recipient = %request.recipient))]
    async fn issue_nonce(&self, request: IssueRequest) -> Result<NonceRecord, Self::Error> {
        if request.amount == TokenAmount::new(0) {
            return Err(PaymentError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        // Reject policy-violating splits at issuance instead of letting the
        // client discover it at verification time.
        self.validator
            .validate(&request.split_payment, request.amount, &request.recipient)?;

        let now = UnixTimestamp::now();
        let ttl = request.ttl_secs.unwrap_or(self.nonce_ttl_secs);
        let record = self.store.create(IssueParams {
            amount: request.amount,
            recipient: request.recipient,
            resource_id: request.resource_id,
            resource_url: request.resource_url,
            split_payment: request.split_payment,
            expiry: now + ttl,
            created_at: now,
        })?;
        tracing::info!(nonce = %record.nonce, expiry = %record.expiry, "issued nonce");
        Ok(record)
    }

    #[instrument(skip_all, err, fields(nonce = %request.payload.nonce))]
    async fn verify(&self, request: &PaymentRequest) -> Result<VerifyReceipt, Self::Error> {
        let now = UnixTimestamp::now();
        let record = self.assert_spendable(request, now)?;
        // Guard failures above leave the record untouched: verification is
        // not consumption and may be retried.
        self.store
            .mark_verified(&record.nonce, &request.client_public_key)?;
        Ok(VerifyReceipt {
            nonce: record.nonce,
            payer: request.client_public_key,
        })
    }

    #[instrument(skip_all, err, fields(nonce = %request.payload.nonce))]
    async fn settle(&self, request: &PaymentRequest) -> Result<SettleReceipt, Self::Error> {
        let nonce = request.payload.nonce.clone();
        let now = UnixTimestamp::now();

        // Pre-claim phase. Any failure here leaves the record claimable.
        let pre_claim = async {
            let record = self.assert_spendable(request, now)?;
            let intent = TransferIntent {
                nonce: &nonce,
                payer: &request.client_public_key,
                amount: record.amount,
                signed_transaction: request.signed_transaction.as_deref(),
            };
            let prepared = self.executor.prepare(&intent)?;
            self.executor
                .ensure_funds(&request.client_public_key, record.amount)
                .await?;
            Ok(prepared)
        };
        let prepared = match pre_claim.await {
            Ok(prepared) => prepared,
            Err(error) => {
                self.record_attempt(&nonce, None, Some(&error));
                return Err(error);
            }
        };

        // The claim must land before the ledger sees the transfer: a racing
        // duplicate observes AlreadySettled here, pre-submission.
        let claimed_signature = prepared.signature().clone();
        match self
            .store
            .claim_settlement(&nonce, &claimed_signature, now)?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadySettled => {
                let error = PaymentError::AlreadySettled;
                self.record_attempt(&nonce, None, Some(&error));
                return Err(error);
            }
            ClaimOutcome::NotFound => {
                let error = PaymentError::NotFound;
                self.record_attempt(&nonce, None, Some(&error));
                return Err(error);
            }
            ClaimOutcome::Expired => {
                let error = PaymentError::Expired;
                self.record_attempt(&nonce, None, Some(&error));
                return Err(error);
            }
        }

        match self.executor.submit(prepared).await {
            Ok(signature) => {
                self.record_attempt(&nonce, Some(signature.clone()), None);
                tracing::info!(nonce = %nonce, signature = %signature, "settlement confirmed");
                Ok(SettleReceipt {
                    nonce,
                    transaction_signature: signature,
                })
            }
            Err(error) => {
                // The claim already consumed the nonce; demote the record so
                // the failure is inspectable, and keep the signature as the
                // once-only transition. Retry requires a fresh nonce.
                if let Err(demote) = self.store.mark_failed(&nonce) {
                    tracing::error!(nonce = %nonce, error = %demote, "failed to demote claimed nonce");
                }
                self.record_attempt(&nonce, Some(claimed_signature), Some(&error));
                Err(error)
            }
        }
    }

    async fn nonce(&self, nonce: &str) -> Result<Option<NonceRecord>, Self::Error> {
        Ok(self.store.get(nonce)?)
    }

    async fn stats(&self) -> Result<StoreStats, Self::Error> {
        Ok(self.store.stats(UnixTimestamp::now())?)
    }

    async fn cleanup(&self) -> Result<CleanupReport, Self::Error> {
        let cleaned = self.store.sweep_expired(UnixTimestamp::now())?;
        if cleaned > 0 {
            tracing::info!(cleaned, "swept expired nonces");
        }
        Ok(CleanupReport { cleaned })
    }
}
