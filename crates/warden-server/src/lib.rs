//! # warden-server
//!
//! HTTP API for the warden governance pipeline. Provides:
//!
//! - `POST /v1/plans` to run a plan through the pipeline
//! - read-only views of the circuit breaker and per-caller budgets
//! - a runtime kill switch
//! - `/health` and Prometheus `/metrics`

pub mod metrics;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use warden_config::ServerConfig;
use warden_core::{Disposition, SubmitRequest, WardenError};
use warden_gateway::Gateway;
use warden_policy::CallerBudget;
use warden_upstream::{BreakerSnapshot, BreakerState};

/// Shared server state.
pub struct AppState {
    pub config: ServerConfig,
    pub gateway: Arc<Gateway>,
    /// Prometheus-compatible metrics.
    pub metrics: metrics::Metrics,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    breaker: &'static str,
}

#[derive(Debug, Deserialize)]
struct KillSwitchRequest {
    active: bool,
}

#[derive(Serialize)]
struct KillSwitchResponse {
    active: bool,
    previous: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

/// Infrastructure error returned by the API as `{error, kind}` JSON.
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error: message.into(),
                kind: "not_found",
            },
        }
    }
}

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        let status = match &err {
            WardenError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WardenError::BudgetExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            WardenError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorBody {
                error: err.to_string(),
                kind: err.kind(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Build the Axum router around an existing gateway.
pub fn build_router(gateway: Arc<Gateway>, config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        config: config.clone(),
        gateway,
        metrics: metrics::Metrics::new(),
    });

    let api_routes = Router::new()
        .route("/v1/plans", post(submit_plan_handler))
        .route("/v1/breaker", get(breaker_handler))
        .route("/v1/budget/{caller_id}", get(budget_handler))
        .route("/v1/kill-switch", post(kill_switch_handler));

    // Apply API key auth if configured
    let api_routes = if config.api_key.is_some() {
        api_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
    } else {
        api_routes
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected_key) = state.config.api_key {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(key) if key == expected_key => {}
            _ => {
                warn!("unauthorized API request, invalid or missing API key");
                state.metrics.inc_http_errors();
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }
    Ok(next.run(request).await)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    let breaker = state.gateway.breaker().state();
    Json(HealthResponse {
        status: if breaker == BreakerState::Open { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        breaker: breaker.as_str(),
    })
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    let body = state
        .metrics
        .render_prometheus(state.gateway.breaker().state());
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

/// Run one plan. Dropping this future (client disconnect) abandons the
/// pipeline; the budget guard refunds and the breaker is left alone.
async fn submit_plan_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<Disposition>, ApiError> {
    state.metrics.inc_http_requests();
    state.metrics.inc_submissions();

    match state.gateway.submit(request).await {
        Ok(disposition) => {
            state.metrics.record_disposition(disposition.status);
            Ok(Json(disposition))
        }
        Err(e) => {
            state.metrics.record_error(&e);
            state.metrics.inc_http_errors();
            Err(e.into())
        }
    }
}

async fn breaker_handler(State(state): State<Arc<AppState>>) -> Json<BreakerSnapshot> {
    state.metrics.inc_http_requests();
    Json(state.gateway.breaker().snapshot())
}

async fn budget_handler(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
) -> Result<Json<CallerBudget>, ApiError> {
    state.metrics.inc_http_requests();
    state
        .gateway
        .budget()
        .snapshot(&caller_id)
        .map(Json)
        .ok_or_else(|| {
            state.metrics.inc_http_errors();
            ApiError::not_found(format!("no budget recorded for caller '{caller_id}'"))
        })
}

async fn kill_switch_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<KillSwitchRequest>,
) -> Json<KillSwitchResponse> {
    state.metrics.inc_http_requests();
    let previous = state.gateway.set_kill_switch(req.active);
    info!(active = req.active, previous, "kill switch set via API");
    Json(KillSwitchResponse {
        active: req.active,
        previous,
    })
}

/// How often idle per-caller budget and rate-limit state is evicted.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn the background task that evicts idle caller state every `interval`.
pub fn spawn_cleanup(gateway: Arc<Gateway>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            gateway.cleanup();
        }
    })
}

/// Start the HTTP server and run until ctrl-c.
pub async fn start_server(gateway: Arc<Gateway>, config: ServerConfig) -> warden_core::Result<()> {
    let listen = config.listen.clone();
    let cleanup = spawn_cleanup(gateway.clone(), CLEANUP_INTERVAL);
    let router = build_router(gateway, config);

    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| WardenError::Config(format!("failed to bind {}: {}", listen, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    cleanup.abort();
    Ok(())
}
