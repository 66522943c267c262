//! Liveness and readiness probes.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::config::RegistryBackend;
use crate::state::AppState;

/// Lookup key; its absence is the expected answer.
const READINESS_KEY: &str = "v1/readiness";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub registry: RegistryCheck,
    pub contracter: bool,
}

/// Outcome of one registry round trip.
#[derive(Serialize)]
pub struct RegistryCheck {
    pub backend: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ready once the registry answers a lookup, `NotFound` included.
pub async fn ready(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let start = Instant::now();
    let error = match state.registry.store().get(READINESS_KEY).await {
        Err(e) if !e.is_not_found() => Some(e.to_string()),
        _ => None,
    };

    let (status, label) = if error.is_none() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let registry = RegistryCheck {
        backend: match state.config.registry_backend {
            RegistryBackend::File => "file",
            RegistryBackend::Redis => "redis",
        },
        latency_ms: start.elapsed().as_millis() as u64,
        error,
    };

    (
        status,
        Json(ReadinessResponse {
            status: label,
            registry,
            contracter: state.config.contracter_enabled,
        }),
    )
}
