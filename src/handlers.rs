//! HTTP endpoints implemented by the facilitator.
//!
//! These are the server-side handlers for nonce issuance, payment
//! verification, and settlement, plus the administrative read endpoints.
//!
//! One envelope everywhere: successes are `{"status": ..., ...}` and failures
//! are `{"status":"error","error": ...}`. Payment endpoints return domain
//! errors with HTTP 200 so clients parse a single shape; storage faults are
//! the only 500s; an absent nonce on the read endpoint is a plain 404. (The
//! surface this reimplements mixed `{error}` and `{status,error}` shapes;
//! normalizing them is deliberate.)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::instrument;

use crate::error::PaymentError;
use crate::facilitator::{Facilitator, IssueRequest};
use crate::types::PaymentRequest;

/// Wire body for `POST /settle`.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleBody {
    pub payment_request: PaymentRequest,
}

/// All facilitator routes. Merge into an app router and attach state:
/// `Router::new().merge(handlers::routes().with_state(state))`.
pub fn routes<F>() -> Router<F>
where
    F: Facilitator<Error = PaymentError> + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/verify", post(post_verify::<F>))
        .route("/settle", post(post_settle::<F>))
        .route("/store-nonce", post(post_store_nonce::<F>))
        .route("/nonce/{nonce}", get(get_nonce::<F>))
        .route("/stats", get(get_stats::<F>))
        .route("/cleanup", post(post_cleanup::<F>))
        .route("/supported", get(get_supported))
        .route("/health", get(get_health))
}

/// Maps a [`PaymentError`] to the wire envelope, deterministically.
fn error_response(error: &PaymentError) -> (StatusCode, Json<serde_json::Value>) {
    let status = if error.is_storage() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({"status": "error", "error": error.to_string()})),
    )
}

/// `POST /verify`: checks a client-signed payment request against its issued
/// nonce: existence, expiry, payload integrity, signature, split policy.
///
/// Verification does not consume the nonce; clients may re-verify freely.
#[instrument(skip_all)]
pub async fn post_verify<F>(
    State(facilitator): State<F>,
    Json(body): Json<PaymentRequest>,
) -> impl IntoResponse
where
    F: Facilitator<Error = PaymentError>,
{
    match facilitator.verify(&body).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "status": "verified",
                "nonce": receipt.nonce,
                "payer": receipt.payer,
            })),
        ),
        Err(error) => {
            tracing::warn!(nonce = %body.payload.nonce, error = %error, "verification failed");
            error_response(&error)
        }
    }
}

/// `POST /settle`: commits a verified payment on the ledger, exactly once per
/// nonce. Runs the full guard set itself; a prior `/verify` is not trusted.
#[instrument(skip_all)]
pub async fn post_settle<F>(
    State(facilitator): State<F>,
    Json(body): Json<SettleBody>,
) -> impl IntoResponse
where
    F: Facilitator<Error = PaymentError>,
{
    let request = &body.payment_request;
    match facilitator.settle(request).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "status": "settled",
                "nonce": receipt.nonce,
                "transactionSignature": receipt.transaction_signature,
            })),
        ),
        Err(error) => {
            tracing::warn!(nonce = %request.payload.nonce, error = %error, "settlement failed");
            error_response(&error)
        }
    }
}

/// `POST /store-nonce`: issues a fresh single-use nonce bound to an amount
/// and recipient set. Returns the record including the payload the client
/// must sign.
#[instrument(skip_all)]
pub async fn post_store_nonce<F>(
    State(facilitator): State<F>,
    Json(body): Json<IssueRequest>,
) -> impl IntoResponse
where
    F: Facilitator<Error = PaymentError>,
{
    match facilitator.issue_nonce(body).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "data": record})),
        ),
        Err(error) => {
            tracing::warn!(error = %error, "nonce issuance failed");
            error_response(&error)
        }
    }
}

/// `GET /nonce/{nonce}`: looks up one nonce record; 404 when absent.
#[instrument(skip_all, fields(nonce = %nonce))]
pub async fn get_nonce<F>(
    State(facilitator): State<F>,
    Path(nonce): Path<String>,
) -> impl IntoResponse
where
    F: Facilitator<Error = PaymentError>,
{
    match facilitator.nonce(&nonce).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "data": record})),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "error": "Unknown nonce"})),
        ),
        Err(error) => error_response(&error),
    }
}

/// `GET /stats`: aggregate nonce-store counters.
#[instrument(skip_all)]
pub async fn get_stats<F>(State(facilitator): State<F>) -> impl IntoResponse
where
    F: Facilitator<Error = PaymentError>,
{
    match facilitator.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "data": stats})),
        ),
        Err(error) => error_response(&error),
    }
}

/// `POST /cleanup`: one on-demand expiry sweep, in addition to the periodic
/// background schedule.
#[instrument(skip_all)]
pub async fn post_cleanup<F>(State(facilitator): State<F>) -> impl IntoResponse
where
    F: Facilitator<Error = PaymentError>,
{
    match facilitator.cleanup().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "data": {"cleaned": report.cleaned}})),
        ),
        Err(error) => error_response(&error),
    }
}

/// `GET /supported`: machine-readable description of the payment surface,
/// for discoverability and debugging tools.
#[instrument(skip_all)]
pub async fn get_supported() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "data": {
            "endpoints": {
                "verify": "POST /verify",
                "settle": "POST /settle",
                "storeNonce": "POST /store-nonce",
            },
            "signature": "ed25519 detached, base58, over the canonical authorization payload",
            "transferEncoding": "base64 bincode VersionedTransaction",
        }
    }))
}

/// `GET /health`: liveness probe.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeePolicy;
    use crate::ledger::SimulatedLedger;
    use crate::lifecycle::PaymentLifecycle;
    use crate::settlement::SettlementExecutor;
    use crate::split::SplitValidator;
    use crate::store::InMemoryNonceStore;
    use crate::types::{Address, NonceRecord};
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal::Decimal;
    use solana_keypair::Keypair;
    use solana_pubkey::Pubkey;
    use solana_signer::Signer;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let validator = SplitValidator::new(
            Address::new(Pubkey::new_from_array([0xFE; 32])),
            FeePolicy::Percent {
                percent: Decimal::from_str("0.4").unwrap(),
            },
        );
        let executor =
            SettlementExecutor::new(Arc::new(SimulatedLedger::new()), Duration::from_secs(5));
        let lifecycle = Arc::new(PaymentLifecycle::new(
            InMemoryNonceStore::new(),
            executor,
            validator,
            300,
        ));
        Router::new().merge(routes().with_state(lifecycle))
    }

    async fn request_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, value)
    }

    async fn issue(app: &Router, amount: u64) -> NonceRecord {
        let (status, body) = request_json(
            app,
            "POST",
            "/store-nonce",
            Some(json!({
                "amount": amount.to_string(),
                "recipient": Address::new(Pubkey::new_from_array([0x01; 32])),
                "resourceId": "article-42",
                "resourceUrl": "https://example.com/article-42",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body["data"].clone()).unwrap()
    }

    fn payment_request_json(record: &NonceRecord, keypair: &Keypair) -> serde_json::Value {
        let payload = record.authorization_payload();
        let signature = keypair.sign_message(&payload.signing_bytes());
        json!({
            "payload": payload,
            "signature": signature.to_string(),
            "clientPublicKey": Address::new(keypair.pubkey()),
        })
    }

    #[tokio::test]
    async fn test_issue_verify_settle_over_http() {
        let app = app();
        let keypair = Keypair::new();
        let record = issue(&app, 100_000).await;

        let verify_body = payment_request_json(&record, &keypair);
        let (status, body) = request_json(&app, "POST", "/verify", Some(verify_body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "verified");

        let (status, body) = request_json(
            &app,
            "POST",
            "/settle",
            Some(json!({"paymentRequest": verify_body})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "settled");
        assert!(body["transactionSignature"].is_string());
    }

    #[tokio::test]
    async fn test_domain_errors_ride_http_200() {
        let app = app();
        let keypair = Keypair::new();
        let record = issue(&app, 100_000).await;

        let mut request = payment_request_json(&record, &keypair);
        request["signature"] = json!(
            Keypair::new()
                .sign_message(b"something else")
                .to_string()
        );
        let (status, body) = request_json(&app, "POST", "/verify", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("signature"));
    }

    #[tokio::test]
    async fn test_double_settle_reports_already_settled() {
        let app = app();
        let keypair = Keypair::new();
        let record = issue(&app, 100_000).await;
        let body = json!({"paymentRequest": payment_request_json(&record, &keypair)});

        let (_, first) = request_json(&app, "POST", "/settle", Some(body.clone())).await;
        assert_eq!(first["status"], "settled");
        let (status, second) = request_json(&app, "POST", "/settle", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["status"], "error");
        assert!(second["error"].as_str().unwrap().contains("settled"));
    }

    #[tokio::test]
    async fn test_nonce_lookup_and_404() {
        let app = app();
        let record = issue(&app, 100_000).await;

        let (status, body) =
            request_json(&app, "GET", &format!("/nonce/{}", record.nonce), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nonce"], json!(record.nonce));

        let (status, body) = request_json(&app, "GET", "/nonce/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_stats_and_cleanup_endpoints() {
        let app = app();
        issue(&app, 100_000).await;

        let (status, body) = request_json(&app, "GET", "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalIssued"], json!(1));

        let (status, body) = request_json(&app, "POST", "/cleanup", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["cleaned"], json!(0));
    }

    #[tokio::test]
    async fn test_issuance_rejects_policy_violations() {
        let app = app();
        let (status, body) = request_json(
            &app,
            "POST",
            "/store-nonce",
            Some(json!({
                "amount": "0",
                "recipient": Address::new(Pubkey::new_from_array([0x01; 32])),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
    }
}
