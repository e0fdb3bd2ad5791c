// src/api.rs
// Axum router for proof issuance (holder app) and verification (scanners)

use crate::crypto::RecoverableSignature;
use crate::error::ProofError;
use crate::metrics::METRICS;
use crate::proof::{ProofPayload, SignedProof};
use crate::service::{ProofConfigView, ProofService, StatsView};
use crate::types::{Address, ChainId, TokenId};
use crate::verifier::Verification;
use axum::extract::Extension;
use axum::http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};

/// Resolves the wallet the upstream session layer authenticated.
pub trait SessionResolver: Send + Sync {
    fn wallet(&self, headers: &HeaderMap) -> Option<Address>;
}

/// Trusts a header set by the authenticating gateway in front of this service.
#[derive(Debug, Clone)]
pub struct HeaderSession {
    header: HeaderName,
}

impl HeaderSession {
    pub fn new(header: &str) -> Result<Self, axum::http::header::InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.as_bytes())?,
        })
    }
}

impl SessionResolver for HeaderSession {
    fn wallet(&self, headers: &HeaderMap) -> Option<Address> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Shared handler state.
pub struct ApiState {
    pub service: Arc<ProofService>,
    pub session: Arc<dyn SessionResolver>,
    /// Scanner keys. Empty means scanner routes are open.
    pub api_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub token_id: TokenId,
    pub chain_id: ChainId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub token_id: TokenId,
    pub chain_id: ChainId,
    pub last_issued_at: i64,
}

/// Signature stays a string so a malformed one becomes a "bad signature"
/// verdict instead of a body rejection.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub data: ProofPayload,
    pub signature: String,
}

/// Issuance / stats failure rendered as `{code, reason, hint, retryable}`.
#[derive(Debug)]
pub struct ApiError(pub ProofError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ProofError::UnsupportedChain(_) => StatusCode::BAD_REQUEST,
            ProofError::OwnershipMismatch => StatusCode::FORBIDDEN,
            ProofError::RpcUnavailable(_)
            | ProofError::LedgerUnavailable(_)
            | ProofError::SignerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProofError::AlreadyUsed => StatusCode::CONFLICT,
            ProofError::InvalidSignature | ProofError::NotYetValid | ProofError::Expired => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        }
    }
}

impl From<ProofError> for ApiError {
    fn from(e: ProofError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self.0.body())).into_response()
    }
}

fn session_wallet(state: &ApiState, headers: &HeaderMap) -> Result<Address, StatusCode> {
    state.session.wallet(headers).ok_or_else(|| {
        warn!("Proof request without an authenticated wallet");
        StatusCode::UNAUTHORIZED
    })
}

async fn issue_proof(
    Extension(state): Extension<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<IssueRequest>,
) -> Result<Json<SignedProof>, Response> {
    let owner = session_wallet(&state, &headers).map_err(IntoResponse::into_response)?;
    state
        .service
        .issue(&req.token_id, &owner, req.chain_id)
        .await
        .map(Json)
        .map_err(|e| ApiError(e).into_response())
}

async fn refresh_proof(
    Extension(state): Extension<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<SignedProof>, Response> {
    let owner = session_wallet(&state, &headers).map_err(IntoResponse::into_response)?;
    state
        .service
        .refresh(&req.token_id, &owner, req.chain_id, req.last_issued_at)
        .await
        .map(Json)
        .map_err(|e| ApiError(e).into_response())
}

async fn verify_proof(
    Extension(state): Extension<Arc<ApiState>>,
    Json(req): Json<VerifyRequest>,
) -> (StatusCode, Json<Verification>) {
    let result = match RecoverableSignature::from_hex(&req.signature) {
        Some(signature) => state.service.verify(&req.data, &signature).await,
        None => {
            let err = Err(ProofError::InvalidSignature);
            METRICS.record_verification(&err);
            err
        }
    };
    let status = match &result {
        Err(ProofError::LedgerUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(Verification::from(&result)))
}

async fn get_config(Extension(state): Extension<Arc<ApiState>>) -> Json<ProofConfigView> {
    Json(state.service.config())
}

async fn get_stats(
    Extension(state): Extension<Arc<ApiState>>,
) -> Result<Json<StatsView>, ApiError> {
    Ok(Json(state.service.stats().await?))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))],
        METRICS.render(),
    )
}

/// Scanner authentication: `Authorization: Bearer <key>` checked against
/// the configured keys in constant time.
pub async fn auth_middleware<B>(
    Extension(state): Extension<Arc<ApiState>>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, StatusCode> {
    if state.api_keys.is_empty() {
        return Ok(next.run(req).await);
    }

    let api_key = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    if let Some(key) = api_key {
        let key_bytes = key.as_bytes();
        let is_valid = state.api_keys.iter().any(|valid_key| {
            let valid_bytes = valid_key.as_bytes();
            // Only compare if lengths match (length is not secret in this context)
            key_bytes.len() == valid_bytes.len() && key_bytes.ct_eq(valid_bytes).into()
        });
        if is_valid {
            return Ok(next.run(req).await);
        }
    }

    warn!("Unauthorized scanner request to {}", req.uri().path());
    Err(StatusCode::UNAUTHORIZED)
}

/// Logs method, path, status and latency of every request.
async fn tracing_middleware<B>(req: Request<B>, next: Next<B>) -> Result<Response, StatusCode> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    info!(
        "{} {} {} - {:.3}s",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64()
    );
    Ok(response)
}

pub fn router(state: Arc<ApiState>) -> Router {
    if state.api_keys.is_empty() {
        warn!("API_KEYS is empty: /proof/verify and /proof/stats accept unauthenticated requests");
    }

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/proof/config", get(get_config));

    // Session-authenticated by the upstream gateway
    let holder_routes = Router::new()
        .route("/proof/issue", post(issue_proof))
        .route("/proof/refresh", post(refresh_proof));

    let scanner_routes = Router::new()
        .route("/proof/verify", post(verify_proof))
        .route("/proof/stats", get(get_stats))
        .route_layer(middleware::from_fn(auth_middleware));

    // Layers run bottom-to-top
    Router::new()
        .merge(public_routes)
        .merge(holder_routes)
        .merge(scanner_routes)
        .layer(Extension(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn(tracing_middleware))
}
