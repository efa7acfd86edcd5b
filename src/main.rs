//! pay402 facilitator HTTP entrypoint.
//!
//! Launches an Axum-based HTTP server exposing nonce issuance, payment
//! verification, and on-chain settlement.
//!
//! Endpoints:
//! - `POST /store-nonce` – Issue a single-use payment nonce
//! - `POST /verify` – Verify a client-signed payment request
//! - `POST /settle` – Settle a payment on the ledger, exactly once per nonce
//! - `GET /nonce/{nonce}` – Look up a nonce record
//! - `GET /stats` – Nonce store counters
//! - `POST /cleanup` – On-demand expiry sweep
//! - `GET /supported`, `GET /health` – Discovery and liveness
//!
//! This server includes:
//! - Request tracing via `TraceLayer`
//! - CORS support for cross-origin clients
//! - A background expiry sweeper sharing the server's shutdown token
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `CONFIG` points at the JSON configuration file

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use pay402::config::{Config, LedgerConfig};
use pay402::handlers;
use pay402::ledger::{LedgerClient, SimulatedLedger, SolanaLedger};
use pay402::lifecycle::PaymentLifecycle;
use pay402::settlement::SettlementExecutor;
use pay402::shutdown::Shutdown;
use pay402::split::SplitValidator;
use pay402::store::SqliteNonceStore;
use pay402::sweeper::ExpirySweeper;
use pay402::telemetry;

/// Initializes the pay402 facilitator server.
///
/// - Loads `.env` variables.
/// - Initializes tracing.
/// - Opens the nonce store and connects the configured ledger backend.
/// - Starts an Axum HTTP server with the payment handlers and a background
///   expiry sweeper.
///
/// Binds to the address specified by the `HOST` and `PORT` env vars.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    telemetry::init_tracing();

    let config = Config::load()?;

    let store = SqliteNonceStore::open(config.database_path())?;
    let ledger: Arc<dyn LedgerClient> = match config.ledger() {
        LedgerConfig::Simulated => {
            tracing::warn!("settlement is SIMULATED; no transfers reach a ledger");
            Arc::new(SimulatedLedger::new())
        }
        LedgerConfig::Rpc { rpc_url, signer } => Arc::new(SolanaLedger::from_base58_signer(
            signer,
            rpc_url.to_string(),
        )),
    };
    let executor =
        SettlementExecutor::new(ledger, Duration::from_secs(config.confirm_timeout_secs()));
    let validator = SplitValidator::new(config.platform_address(), config.fee().clone());
    let lifecycle = Arc::new(PaymentLifecycle::new(
        store,
        executor,
        validator,
        config.nonce_ttl_secs(),
    ));

    let shutdown = Shutdown::try_new()?;

    let sweeper = ExpirySweeper::new(
        Arc::clone(&lifecycle),
        Duration::from_secs(config.sweep_interval_secs()),
    );
    tokio::spawn(sweeper.run(shutdown.token()));

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(lifecycle))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let axum_cancellation_token = shutdown.token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
