//! Pay-per-request micropayments over HTTP 402.
//!
//! This crate implements a payment **facilitator**: a resource server issues
//! a payment challenge, a client obtains a single-use nonce bound to an
//! amount and recipient set, signs the authorization payload, and presents
//! proof of payment; the facilitator verifies the proof, enforces the
//! configured revenue-share policy on split payments, and commits the
//! transfer on-chain exactly once.
//!
//! # The state machine
//!
//! `Requested → NonceIssued → Verified → {Settled | Failed | Expired}`
//!
//! The correctness core is the settlement claim: a conditional update on the
//! nonce record's transaction signature (`None → Some`, at most once) that
//! lands *before* the ledger sees the transfer. Two racing `/settle` calls
//! resolve to one submission and one `AlreadySettled`, with no global lock
//! across unrelated nonces.
//!
//! # Modules
//!
//! - [`config`] — Immutable server configuration, fee policy, ledger mode.
//! - [`error`] — The `PaymentError` taxonomy returned by every core operation.
//! - [`facilitator`] — The [`Facilitator`](facilitator::Facilitator) trait.
//! - [`lifecycle`] — Reference implementation owning the state machine.
//! - [`handlers`] — HTTP endpoints (`/verify`, `/settle`, `/store-nonce`, ...).
//! - [`ledger`] — Ledger client interface; Solana RPC and simulated backends.
//! - [`settlement`] — Balance gate, submission, bounded confirmation.
//! - [`signature`] — Detached ed25519 payload-signature verification.
//! - [`split`] — Split-payment validation against the fee policy.
//! - [`store`] — Nonce records and the settlement audit log (SQLite, memory).
//! - [`sweeper`] — Periodic expiry cleanup.
//! - [`timestamp`] — Unix timestamp type for expiry windows.

pub mod config;
pub mod error;
pub mod facilitator;
pub mod handlers;
pub mod ledger;
pub mod lifecycle;
pub mod settlement;
pub mod shutdown;
pub mod signature;
pub mod split;
pub mod store;
pub mod sweeper;
pub mod telemetry;
pub mod timestamp;
pub mod types;
