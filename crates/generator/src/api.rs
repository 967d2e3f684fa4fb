//! HTTP API for health checks, Prometheus metrics and flag control

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use generator_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::{GeneratorMetrics, StructuredLogger},
    FlagEngine, FlagError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: GeneratorMetrics,
    pub flags: Arc<FlagEngine>,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: GeneratorMetrics,
        flags: Arc<FlagEngine>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            flags,
            logger,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Health check response - returns 200 while operational, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still generating
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the scheduler runs
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_flags(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.flags.list())
}

#[derive(Debug, Deserialize)]
pub struct FlagParams {
    pub flag: Option<String>,
    pub enabled: Option<String>,
}

#[derive(Debug, Serialize)]
struct FlagChange {
    flag: String,
    enabled: bool,
    changed: bool,
}

/// `true`/`false`/`1`/`0`
fn parse_enabled(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Switch a root flag - 202 on success, 404 for unknown flags, 400 otherwise
async fn set_flag(State(state): State<Arc<AppState>>, Query(params): Query<FlagParams>) -> Response {
    let Some(flag) = params.flag.filter(|f| !f.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing query parameter: flag");
    };
    let Some(raw) = params.enabled else {
        return error_response(StatusCode::BAD_REQUEST, "missing query parameter: enabled");
    };
    let Some(enabled) = parse_enabled(&raw) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("enabled must be true, false, 1 or 0, got {:?}", raw),
        );
    };

    match state.flags.set_enabled(&flag, enabled) {
        Ok(changed) => {
            if changed {
                state.logger.log_flag_change(&flag, enabled, "api");
            }
            let active = state.flags.list().iter().filter(|f| f.enabled).count();
            state.metrics.set_active_flags(active);
            info!(flag = %flag, enabled = enabled, changed = changed, "Flag update accepted");

            (
                StatusCode::ACCEPTED,
                Json(FlagChange {
                    flag,
                    enabled,
                    changed,
                }),
            )
                .into_response()
        }
        Err(e @ FlagError::Unknown(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ FlagError::Derived(_)) => {
            warn!(flag = %flag, "Rejected toggle of derived flag");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/flags", get(list_flags))
        .route("/api/v1/flag", post(set_flag))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
