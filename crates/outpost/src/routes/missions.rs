//! Public mission endpoints: listing, verification, history, live codes.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use questline_common::{Eligibility, Mission, QuestlineError};

use super::ApiError;
use crate::clients::Caller;
use crate::missions::{self, CodeLookup, HistoryPage, MissionRepository};
use crate::state::AppState;

/// Rate limit scope for the live code widget
const LIVE_CODE_SCOPE: &str = "totp";

#[derive(Serialize)]
pub struct MissionView {
    #[serde(flatten)]
    mission: Mission,
    completion_count: u64,
    eligibility: Eligibility,
}

async fn mission_view(
    state: &AppState,
    caller: &Caller,
    mission: Mission,
    now: i64,
) -> Result<MissionView, QuestlineError> {
    let stats = state
        .store
        .completion_stats(mission.id, &caller.identity)
        .await?;
    let eligibility = missions::check_eligibility(&mission, &stats, now);

    Ok(MissionView {
        completion_count: stats.total_completions,
        eligibility,
        mission,
    })
}

/// Active missions with the caller's eligibility
pub async fn list_missions(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<MissionView>>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let active = state.store.active_missions().await?;

    let mut views = Vec::with_capacity(active.len());
    for mission in active {
        views.push(mission_view(&state, &caller, mission, now).await?);
    }
    Ok(Json(views))
}

pub async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    caller: Caller,
) -> Result<Json<MissionView>, ApiError> {
    let mission = state
        .store
        .get_mission(id)
        .await?
        .ok_or_else(|| QuestlineError::NotFound("Mission not found.".to_string()))?;

    let now = chrono::Utc::now().timestamp();
    Ok(Json(mission_view(&state, &caller, mission, now).await?))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    code: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    success: bool,
    message: String,
    credits_earned: u32,
    new_balance: i64,
}

/// Redeem a `STATIC-TOTP` code for the caller
pub async fn verify_code(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    caller: Caller,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let result = missions::redeem(
        &state.store,
        &state.totp,
        id,
        &caller.identity,
        &payload.code,
        now,
    )
    .await;

    state.stats.record_attempt(result.is_ok());

    let redemption = result.inspect_err(|e| {
        tracing::debug!(mission_id = id, identity = %caller.identity, kind = e.kind(), "Verification failed");
    })?;

    Ok(Json(VerifyResponse {
        success: true,
        message: redemption.message,
        credits_earned: redemption.credits_earned,
        new_balance: redemption.new_balance,
    }))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

/// The caller's completed missions, newest first
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    caller: Caller,
) -> Result<Json<HistoryPage>, ApiError> {
    let (page, per_page) = state.config.history.clamp(query.page, query.per_page);
    let history = state.store.history(&caller.identity, page, per_page).await?;
    Ok(Json(history))
}

#[derive(Deserialize)]
pub struct LiveCodeQuery {
    code_id: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LiveCodeResponse {
    static_code: String,
    totp: String,
    full_code: String,
    /// Seconds until the code rolls over
    expires_in: u64,
    expires_at: i64,
}

/// The code a partner page displays right now.
///
/// Uses `code_id` when given, otherwise the mission's oldest live code.
pub async fn live_code(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<LiveCodeQuery>,
    caller: Caller,
) -> Result<Json<LiveCodeResponse>, ApiError> {
    state
        .limiter
        .check(
            LIVE_CODE_SCOPE,
            &caller.client,
            state.config.rate_limit.display_requests_per_minute,
        )
        .await?;

    let now = chrono::Utc::now().timestamp();
    let live = state.store.live_codes(id, now).await?;

    let record = match query.code_id {
        Some(code_id) => live.into_iter().find(|c| c.id == code_id),
        None => live.into_iter().next(),
    }
    .ok_or_else(|| QuestlineError::NotFound("Code not found or inactive.".to_string()))?;

    let current = match state.totp.current_at(record.secret.as_str(), now) {
        Ok(current) => current,
        Err(e) => {
            tracing::error!(mission_id = id, code_id = record.id, error = %e, "Stored TOTP secret is unusable");
            return Err(QuestlineError::Otp(e).into());
        }
    };

    state.stats.record_live_code_view();

    Ok(Json(LiveCodeResponse {
        full_code: record.full_code(&current.code),
        static_code: record.code,
        totp: current.code,
        expires_in: current.seconds_remaining,
        expires_at: current.expires_at,
    }))
}
