//! Liveness, readiness, and counters.

use axum::{Json, extract::State, http::StatusCode};
use redis::aio::ConnectionManager;
use serde::Serialize;

use questline_common::TotpParams;

use crate::state::{AppState, StatsSnapshot};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Process is up; dependencies are not checked
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "outpost",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Code settings every verification runs with
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TotpSettings {
    time_step_secs: u64,
    window: u32,
    digits: u32,
    /// How long one displayed code keeps verifying
    acceptance_span_secs: u64,
}

impl From<&TotpParams> for TotpSettings {
    fn from(params: &TotpParams) -> Self {
        Self {
            time_step_secs: params.time_step,
            window: params.window,
            digits: params.digits,
            acceptance_span_secs: params.acceptance_span_secs(),
        }
    }
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    redis: bool,
    admin_api: bool,
    totp: TotpSettings,
}

/// Ready to verify codes: Redis answers and the settings are in place.
/// Replies 503 with the same body when Redis is down.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let redis = redis_reachable(&state.redis).await;
    if !redis {
        tracing::warn!("Readiness check failed: Redis unreachable");
    }

    let (status, label) = if redis {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(ReadyResponse {
            status: label,
            redis,
            admin_api: state.config.admin_token.is_some(),
            totp: TotpSettings::from(&state.totp),
        }),
    )
}

async fn redis_reachable(redis: &ConnectionManager) -> bool {
    let mut conn = redis.clone();
    let reply: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    reply.is_ok_and(|r| r == "PONG")
}

#[derive(Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    counters: StatsSnapshot,
    #[serde(flatten)]
    totp: TotpSettings,
}

/// Request counters since start, plus the active TOTP settings
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        counters: state.stats.snapshot(),
        totp: TotpSettings::from(&state.totp),
    })
}
