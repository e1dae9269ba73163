use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use inksync_core::cache::MemoryCache;
use inksync_core::store::{EntityStore, LibSqlStore, MemoryStore};
use inksync_core::util::fingerprint;
use inksync_core::{BatchRequest, BatchResponse, SyncEngine};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{BatchRateLimiter, RateLimitMetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: SyncEngine,
    rate_limiter: Arc<BatchRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: SyncEngine) -> Self {
        Self {
            rate_limiter: Arc::new(BatchRateLimiter::from_config(config.as_ref())),
            engine,
            config,
        }
    }

    /// Open the configured store and build the engine around it.
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let store: Arc<dyn EntityStore> = match &config.database_path {
            Some(path) => {
                let store = LibSqlStore::open(path).await.map_err(|error| {
                    AppError::internal(format!("Failed to open database: {error}"))
                })?;
                tracing::info!(path = %path.display(), "Using libSQL store");
                Arc::new(store)
            }
            None => {
                tracing::warn!("INKSYNC_DATABASE_PATH not set; state is kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        let engine = SyncEngine::new(store, Arc::new(MemoryCache::new()), config.engine_config());
        Ok(Self::new(config, engine))
    }
}

pub fn app_router(state: AppState) -> Router {
    let v1 = Router::new().route("/sync/batch", post(sync_batch));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
        rate_limit: state.rate_limiter.metrics_snapshot(),
    })
}

async fn sync_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let device = request
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|device| !device.is_empty())
        .map(str::to_string);
    if let Some(device) = device.as_deref() {
        state.rate_limiter.check(device).await?;
    }

    let response = state.engine.submit(request).await?;
    tracing::info!(
        endpoint = "sync_batch",
        device = device.as_deref().map(fingerprint),
        accepted = response.result.accepted.len(),
        conflicts = response.result.conflicts.len(),
        failed = response.result.failed.len(),
        "Processed sync batch"
    );
    Ok(Json(response))
}
