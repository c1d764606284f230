//! Withdrawal relay: a small HTTP front for paying tokens out of the central
//! reserve to a user's external address.
//!
//! The token network itself sits behind [`TransferBackend`]. At start-up the
//! relay walks the configured backend nodes with a bounded number of rounds
//! and a fixed backoff; if none answers, every withdrawal is refused with
//! 503. A transfer that was submitted is never retried.

use crate::amount::{ensure_positive_whole, serde_amount, Amount};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

const RESERVE_SCHEME: &str = "reserve://";
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const MIN_ADDRESS_LEN: usize = 32;
const MAX_ADDRESS_LEN: usize = 44;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient central reserve: requested {requested}, available {available}")]
    InsufficientReserve { requested: Amount, available: Amount },
    #[error("Transfer rejected by network: {0}")]
    Rejected(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_)
            | RelayError::InvalidDestination(_)
            | RelayError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            RelayError::InsufficientReserve { .. } => StatusCode::CONFLICT,
            RelayError::Rejected(_) => StatusCode::BAD_GATEWAY,
            RelayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Connection to one node of the token network.
pub trait TransferBackend: Send + Sync {
    fn endpoint(&self) -> &str;
    fn reserve_balance(&self) -> Result<Amount, RelayError>;
    /// Submits a transfer from the central reserve and returns its signature.
    fn transfer(&self, destination: &str, amount: Amount) -> Result<String, RelayError>;
}

pub trait BackendConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn TransferBackend>, RelayError>;
}

/// Tries every endpoint in order, for up to `attempts` rounds, sleeping
/// `backoff` between rounds.
pub async fn connect_with_failover(
    connector: &dyn BackendConnector,
    endpoints: &[String],
    attempts: u32,
    backoff: Duration,
) -> Result<Arc<dyn TransferBackend>, RelayError> {
    if endpoints.is_empty() {
        return Err(RelayError::Unavailable("no backend endpoints configured".to_string()));
    }

    for round in 1..=attempts.max(1) {
        for endpoint in endpoints {
            match connector.connect(endpoint) {
                Ok(backend) => {
                    info!("Connected to backend {} (round {})", endpoint, round);
                    return Ok(backend);
                }
                Err(e) => warn!("Backend {} unreachable (round {}): {}", endpoint, round, e),
            }
        }
        if round < attempts {
            tokio::time::sleep(backoff).await;
        }
    }

    Err(RelayError::Unavailable(format!(
        "none of {} backend node(s) reachable after {} attempt(s)",
        endpoints.len(),
        attempts.max(1)
    )))
}

/// Accepts base58 addresses of 32 to 44 characters.
pub fn validate_destination(address: &str) -> Result<(), RelayError> {
    let address = address.trim();
    if address.len() < MIN_ADDRESS_LEN || address.len() > MAX_ADDRESS_LEN {
        return Err(RelayError::InvalidDestination(format!(
            "expected {}-{} characters, got {}",
            MIN_ADDRESS_LEN,
            MAX_ADDRESS_LEN,
            address.len()
        )));
    }
    if let Some(bad) = address.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(RelayError::InvalidDestination(format!(
            "character '{}' is not base58",
            bad
        )));
    }
    Ok(())
}

pub fn validate_amount(amount: Amount) -> Result<(), RelayError> {
    ensure_positive_whole(amount).map_err(|e| RelayError::InvalidAmount(e.to_string()))
}

/// In-process central reserve. Stands in for the token network in
/// development and tests.
pub struct ReserveBackend {
    endpoint: String,
    reserve: Mutex<Amount>,
    nonce: AtomicU64,
}

impl ReserveBackend {
    pub fn new(endpoint: impl Into<String>, reserve: Amount) -> Self {
        ReserveBackend {
            endpoint: endpoint.into(),
            reserve: Mutex::new(reserve),
            nonce: AtomicU64::new(0),
        }
    }

    fn sign(&self, destination: &str, amount: Amount, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.endpoint.as_bytes());
        hasher.update(destination.as_bytes());
        hasher.update(amount.to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

impl TransferBackend for ReserveBackend {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn reserve_balance(&self) -> Result<Amount, RelayError> {
        Ok(*self.reserve.lock())
    }

    fn transfer(&self, destination: &str, amount: Amount) -> Result<String, RelayError> {
        validate_destination(destination)?;
        validate_amount(amount)?;

        let mut reserve = self.reserve.lock();
        if amount > *reserve {
            return Err(RelayError::InsufficientReserve {
                requested: amount,
                available: *reserve,
            });
        }
        *reserve -= amount;
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(self.sign(destination, amount, nonce))
    }
}

/// Connector for `reserve://` endpoints. Every endpoint shares one reserve.
pub struct ReserveConnector {
    backend_reserve: Amount,
    unreachable: HashSet<String>,
    connects: AtomicU64,
}

impl ReserveConnector {
    pub fn new(reserve: Amount) -> Self {
        ReserveConnector {
            backend_reserve: reserve,
            unreachable: HashSet::new(),
            connects: AtomicU64::new(0),
        }
    }

    /// Marks endpoints that refuse connections.
    pub fn with_unreachable<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unreachable.extend(endpoints.into_iter().map(Into::into));
        self
    }

    /// Connection attempts made so far.
    pub fn connect_calls(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }
}

impl BackendConnector for ReserveConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn TransferBackend>, RelayError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if !endpoint.starts_with(RESERVE_SCHEME) {
            return Err(RelayError::Unavailable(format!("unsupported endpoint '{}'", endpoint)));
        }
        if self.unreachable.contains(endpoint) {
            return Err(RelayError::Unavailable(format!("{} refused the connection", endpoint)));
        }
        Ok(Arc::new(ReserveBackend::new(endpoint, self.backend_reserve)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub destination_address: String,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub signature: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct RelayStats {
    total_requests: AtomicU64,
    successful_transfers: AtomicU64,
    failed_transfers: AtomicU64,
}

#[derive(Clone)]
pub struct RelayState {
    backend: Option<Arc<dyn TransferBackend>>,
    stats: Arc<RelayStats>,
    started: Instant,
}

impl RelayState {
    pub fn new(backend: Option<Arc<dyn TransferBackend>>) -> Self {
        RelayState {
            backend,
            stats: Arc::new(RelayStats::default()),
            started: Instant::now(),
        }
    }

    /// Connects through `connector`; an unreachable network leaves the relay
    /// up but answering 503.
    pub async fn connect(
        connector: &dyn BackendConnector,
        endpoints: &[String],
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        match connect_with_failover(connector, endpoints, attempts, backoff).await {
            Ok(backend) => Self::new(Some(backend)),
            Err(e) => {
                warn!("Relay starting without a backend: {}", e);
                Self::new(None)
            }
        }
    }
}

async fn withdraw(
    State(state): State<RelayState>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<WithdrawResponse>, RelayError> {
    state.stats.total_requests.fetch_add(1, Ordering::Relaxed);
    let result = process_withdrawal(&state, payload);
    match &result {
        Ok(_) => state.stats.successful_transfers.fetch_add(1, Ordering::Relaxed),
        Err(_) => state.stats.failed_transfers.fetch_add(1, Ordering::Relaxed),
    };
    result.map(Json)
}

fn process_withdrawal(
    state: &RelayState,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<WithdrawResponse, RelayError> {
    let Json(request) = payload.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let backend = state
        .backend
        .as_ref()
        .ok_or_else(|| RelayError::Unavailable("no backend node reachable".to_string()))?;

    let destination = request.destination_address.trim();
    validate_destination(destination)?;
    validate_amount(request.amount)?;

    let signature = backend.transfer(destination, request.amount).map_err(|e| {
        warn!("Withdrawal of {} to {} failed: {}", request.amount, destination, e);
        e
    })?;
    info!("Sent {} tokens to {} ({})", request.amount, destination, signature);

    Ok(WithdrawResponse {
        signature,
        message: format!("Sent {} tokens to {}", request.amount, destination),
    })
}

async fn health(State(state): State<RelayState>) -> impl IntoResponse {
    let (status, endpoint, reserve) = match &state.backend {
        Some(backend) => (
            "healthy",
            Some(backend.endpoint().to_string()),
            backend.reserve_balance().ok().map(|r| r.to_string()),
        ),
        None => ("degraded", None, None),
    };

    Json(serde_json::json!({
        "status": status,
        "backend": endpoint,
        "reserve": reserve,
        "total_requests": state.stats.total_requests.load(Ordering::Relaxed),
        "successful_transfers": state.stats.successful_transfers.load(Ordering::Relaxed),
        "failed_transfers": state.stats.failed_transfers.load(Ordering::Relaxed),
        "uptime_seconds": state.started.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn build_relay_router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/withdraw", post(withdraw))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
}

pub async fn run_relay_server(state: RelayState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_relay_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Withdrawal relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down relay");
        })
        .await?;
    Ok(())
}
