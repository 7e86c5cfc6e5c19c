//! HTTP API for health checks, swap status and operator actions

mod auth;

pub use auth::AdminAuth;

use crate::config::ApiConfig;
use crate::coordination::SwapPipeline;
use crate::error::{ErrorKind, RouterError, RouterResult};
use crate::state::{SwapKey, SwapStatusInfo};

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SwapPipeline>,
    pub admin: Arc<AdminAuth>,
}

pub fn router(pipeline: Arc<SwapPipeline>, admin: AdminAuth) -> Router {
    let state = AppState {
        pipeline,
        admin: Arc::new(admin),
    };

    let admin_routes = Router::new()
        .route("/admin/passbigvalue", post(pass_big_value))
        .route("/admin/reswap", post(reswap))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    // browsers may read status cross-origin but never send admin headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/stats", get(get_stats))
        .route("/swap/:chain_id/:txid/:log_index", get(get_swap))
        .route("/register", post(register_swap))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, pipeline: Arc<SwapPipeline>) -> RouterResult<()> {
    let app = router(pipeline, AdminAuth::new(&config));

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RouterError::Internal(format!("bind api server {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| RouterError::Internal(format!("api server: {}", e)))
}

/// Router errors rendered as `{"error": "..."}`
struct ApiError(RouterError);

impl From<RouterError> for ApiError {
    fn from(e: RouterError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match (self.0.root(), self.0.kind()) {
            (RouterError::SwapNotFound { .. } | RouterError::SwapResultNotFound { .. }, _) => {
                StatusCode::NOT_FOUND
            }
            (RouterError::ChainNotFound { .. }, _) => StatusCode::BAD_REQUEST,
            (
                RouterError::GuardViolation(_)
                | RouterError::InvalidStatusTransition { .. }
                | RouterError::AlreadyExists { .. },
                _,
            ) => StatusCode::CONFLICT,
            (_, ErrorKind::Rejected) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Transient) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("API request failed: {}", self.0);
        }
        let message = self.0.root().to_string();
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - store and every chain reachable
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.pipeline.machine().store().health_check().await.is_ok();

    let registry = state.pipeline.registry();
    let mut details = Vec::new();
    for chain_id in registry.chain_ids() {
        let healthy = match registry.get_bridge(chain_id) {
            Ok(bridge) => bridge.get_latest_block_number().await.is_ok(),
            Err(_) => false,
        };
        details.push(ChainHealth {
            chain_id,
            healthy,
            paused: registry.is_chain_paused(chain_id),
        });
    }
    let chains = details.iter().all(|c| c.healthy);

    let status = if store && chains {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready: store && chains,
            store,
            chains,
            details,
        }),
    )
}

/// Swap counts by status
async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let counts = state.pipeline.machine().status_counts().await?;
    Ok(Json(StatsResponse {
        total: counts.iter().map(|(_, n)| n).sum(),
        statuses: counts
            .into_iter()
            .map(|(status, count)| StatusCount {
                status: status.as_str().to_string(),
                code: status.code(),
                count,
            })
            .collect(),
    }))
}

async fn get_swap(
    State(state): State<AppState>,
    Path((chain_id, txid, log_index)): Path<(u64, String, u32)>,
) -> Result<Json<SwapStatusInfo>, ApiError> {
    let key = SwapKey::new(chain_id, &txid, log_index);
    state
        .pipeline
        .machine()
        .swap_status_info(&key)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError(RouterError::SwapNotFound {
                key: key.to_string(),
            })
        })
}

async fn register_swap(
    State(state): State<AppState>,
    Json(req): Json<SwapRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let swaps = state
        .pipeline
        .register(req.chain_id, &req.txid, req.log_index)
        .await?;
    Ok(Json(RegisterResponse {
        swaps: swaps
            .into_iter()
            .map(|swap| RegisteredEntry {
                key: swap.key.to_string(),
                log_index: swap.key.log_index,
                status: swap.status.as_str().to_string(),
                memo: swap.memo,
            })
            .collect(),
    }))
}

async fn pass_big_value(
    State(state): State<AppState>,
    Json(req): Json<SwapRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let machine = state.pipeline.machine();
    let swap = machine
        .find_swap_auto(&req.key())
        .await?
        .ok_or_else(|| RouterError::SwapNotFound {
            key: req.key().to_string(),
        })?;
    machine.approve_big_value(&swap.key).await?;
    Ok(Json(ActionResponse::ok(&swap.key)))
}

async fn reswap(
    State(state): State<AppState>,
    Json(req): Json<SwapRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let machine = state.pipeline.machine();
    let swap = machine
        .find_swap_auto(&req.key())
        .await?
        .ok_or_else(|| RouterError::SwapNotFound {
            key: req.key().to_string(),
        })?;
    let bridge = state.pipeline.registry().get_bridge(swap.to_chain_id)?;
    machine.reswap(&swap.key, bridge.as_ref()).await?;
    Ok(Json(ActionResponse::ok(&swap.key)))
}

// Request and response types

#[derive(Debug, Deserialize)]
struct SwapRequest {
    chain_id: u64,
    txid: String,
    #[serde(default)]
    log_index: u32,
}

impl SwapRequest {
    fn key(&self) -> SwapKey {
        SwapKey::new(self.chain_id, &self.txid, self.log_index)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    store: bool,
    chains: bool,
    details: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain_id: u64,
    healthy: bool,
    paused: bool,
}

#[derive(Serialize)]
struct StatsResponse {
    total: u64,
    statuses: Vec<StatusCount>,
}

#[derive(Serialize)]
struct StatusCount {
    status: String,
    code: u16,
    count: u64,
}

#[derive(Serialize)]
struct RegisterResponse {
    swaps: Vec<RegisteredEntry>,
}

#[derive(Serialize)]
struct RegisteredEntry {
    key: String,
    log_index: u32,
    status: String,
    memo: String,
}

#[derive(Serialize)]
struct ActionResponse {
    result: String,
    key: String,
}

impl ActionResponse {
    fn ok(key: &SwapKey) -> Self {
        Self {
            result: "Success".to_string(),
            key: key.to_string(),
        }
    }
}
