//! Domain and wire types for nonce-bound payments.
//!
//! Amounts and timestamps cross the wire as stringified integers (the same
//! convention the surrounding x402 tooling uses) so JavaScript clients never
//! lose precision. Addresses and signatures are base58 strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_pubkey::Pubkey;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::timestamp::UnixTimestamp;

/// A payment amount in minimal currency units (e.g. lamports).
///
/// Serialized as a stringified integer, like [`UnixTimestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(rhs.0).map(TokenAmount)
    }

    pub fn saturating_sub(self, rhs: TokenAmount) -> TokenAmount {
        TokenAmount(self.0.saturating_sub(rhs.0))
    }

    /// Absolute difference in minimal units; used for rounding tolerances.
    pub fn abs_diff(self, rhs: TokenAmount) -> u64 {
        self.0.abs_diff(rhs.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl From<TokenAmount> for Decimal {
    fn from(amount: TokenAmount) -> Self {
        Decimal::from(amount.0)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let units = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("amount must be a non-negative integer"))?;
        Ok(TokenAmount(units))
    }
}

/// A ledger address, serialized as a base58 string.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Address(Pubkey);

impl Address {
    pub const fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    pub fn pubkey(&self) -> &Pubkey {
        &self.0
    }
}

impl From<Pubkey> for Address {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl From<Address> for Pubkey {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pubkey =
            Pubkey::from_str(s).map_err(|_| format!("Failed to decode ledger address: {s}"))?;
        Ok(Self(pubkey))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let pubkey = Pubkey::from_str(&s)
            .map_err(|_| serde::de::Error::custom("Failed to decode ledger address"))?;
        Ok(Self(pubkey))
    }
}

/// The on-chain (or simulated) signature identifying a committed settlement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettlementSignature(String);

impl SettlementSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SettlementSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SettlementSignature {
    fn from(signature: String) -> Self {
        Self(signature)
    }
}

/// The signed, non-repudiable statement of payment intent.
///
/// Returned by nonce issuance exactly as the client must sign it: the client
/// signs [`AuthorizationPayload::signing_bytes`], the canonical JSON
/// serialization of these fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPayload {
    pub amount: TokenAmount,
    pub recipient: Address,
    pub resource_id: String,
    pub resource_url: String,
    pub nonce: String,
    pub expiry: UnixTimestamp,
}

impl AuthorizationPayload {
    /// Canonical byte representation covered by the client's detached
    /// signature. Compact JSON, fields in declaration order.
    pub fn signing_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("AuthorizationPayload serializes infallibly")
    }
}

/// One output of a split payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRecipient {
    pub address: Address,
    pub amount: TokenAmount,
    /// Informational share, e.g. `0.4`. Amounts are authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    pub description: String,
}

/// Split-payment instruction attached to a nonce.
///
/// Tagged so that "enabled but recipient-less" cannot be smuggled through
/// optional fields: the wire shape `{enabled, totalAmount?, recipients?}` is
/// converted on deserialization and rejected when inconsistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SplitPaymentWire", into = "SplitPaymentWire")]
pub enum SplitPayment {
    Disabled,
    Enabled {
        total_amount: TokenAmount,
        recipients: Vec<SplitRecipient>,
    },
}

impl SplitPayment {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SplitPayment::Enabled { .. })
    }
}

impl Default for SplitPayment {
    fn default() -> Self {
        SplitPayment::Disabled
    }
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SplitPaymentWire {
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_amount: Option<TokenAmount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    recipients: Vec<SplitRecipient>,
}

impl TryFrom<SplitPaymentWire> for SplitPayment {
    type Error = String;

    fn try_from(wire: SplitPaymentWire) -> Result<Self, Self::Error> {
        if !wire.enabled {
            return Ok(SplitPayment::Disabled);
        }
        let total_amount = wire
            .total_amount
            .ok_or_else(|| "enabled split payment requires totalAmount".to_string())?;
        Ok(SplitPayment::Enabled {
            total_amount,
            recipients: wire.recipients,
        })
    }
}

impl From<SplitPayment> for SplitPaymentWire {
    fn from(split: SplitPayment) -> Self {
        match split {
            SplitPayment::Disabled => SplitPaymentWire {
                enabled: false,
                total_amount: None,
                recipients: Vec::new(),
            },
            SplitPayment::Enabled {
                total_amount,
                recipients,
            } => SplitPaymentWire {
                enabled: true,
                total_amount: Some(total_amount),
                recipients,
            },
        }
    }
}

/// Lifecycle state of an issued nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceStatus {
    Pending,
    Verified,
    Settled,
    Failed,
    Expired,
}

impl NonceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NonceStatus::Pending => "pending",
            NonceStatus::Verified => "verified",
            NonceStatus::Settled => "settled",
            NonceStatus::Failed => "failed",
            NonceStatus::Expired => "expired",
        }
    }
}

impl FromStr for NonceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NonceStatus::Pending),
            "verified" => Ok(NonceStatus::Verified),
            "settled" => Ok(NonceStatus::Settled),
            "failed" => Ok(NonceStatus::Failed),
            "expired" => Ok(NonceStatus::Expired),
            other => Err(format!("unknown nonce status: {other}")),
        }
    }
}

impl Display for NonceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable record of one issued nonce.
///
/// `transaction_signature` transitions `None` → `Some` exactly once, and only
/// through the store's conditional update. Everything else is bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRecord {
    pub nonce: String,
    pub amount: TokenAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_public_key: Option<Address>,
    pub recipient: Address,
    pub resource_id: String,
    pub resource_url: String,
    pub expiry: UnixTimestamp,
    #[serde(default)]
    pub split_payment: SplitPayment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_signature: Option<SettlementSignature>,
    pub status: NonceStatus,
    pub created_at: UnixTimestamp,
}

impl NonceRecord {
    /// The payload a client must sign to spend this nonce.
    pub fn authorization_payload(&self) -> AuthorizationPayload {
        AuthorizationPayload {
            amount: self.amount,
            recipient: self.recipient,
            resource_id: self.resource_id.clone(),
            resource_url: self.resource_url.clone(),
            nonce: self.nonce.clone(),
            expiry: self.expiry,
        }
    }

    /// Status as observed at `now`: an unsettled record past its expiry reads
    /// as `Expired` even before the sweep removes it.
    pub fn status_at(&self, now: UnixTimestamp) -> NonceStatus {
        match self.status {
            NonceStatus::Pending | NonceStatus::Verified if self.expiry.is_past(now) => {
                NonceStatus::Expired
            }
            status => status,
        }
    }
}

/// Client-submitted proof of payment. Wire value, never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payload: AuthorizationPayload,
    /// Detached base58 ed25519 signature over [`AuthorizationPayload::signing_bytes`].
    pub signature: String,
    pub client_public_key: Address,
    /// Base64 bincode-encoded signed transfer; required for `/settle`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<String>,
}

/// Outcome class of one settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Confirmed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Confirmed => "confirmed",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(AttemptStatus::Confirmed),
            "failed" => Ok(AttemptStatus::Failed),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Append-only audit row, one per settlement attempt (failures included).
///
/// Written before the HTTP response returns, so reconciliation never depends
/// on the response reaching the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_signature: Option<SettlementSignature>,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: UnixTimestamp,
}

/// Aggregate counters over the nonce store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_issued: u64,
    pub settled: u64,
    pub failed: u64,
    pub pending: u64,
    pub expired: u64,
}
