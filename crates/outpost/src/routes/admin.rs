//! Admin endpoints: mission and code management, credit ledger, stats.

use axum::{
    Json,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use questline_common::constants::{COMPLETIONS_PER_PAGE, headers};
use questline_common::{
    Identity, Mission, MissionCode, MissionUpdate, NewMission, QuestlineError, Secret,
};

use super::ApiError;
use crate::missions::CompletionPage;
use crate::state::{AppState, StatsSnapshot};

/// Reject requests without the configured `X-Admin-Token`.
///
/// Every admin route is refused when no token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(headers::X_ADMIN_TOKEN)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = authorize(state.config.admin_token.as_deref(), provided) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

fn authorize(expected: Option<&str>, provided: Option<&str>) -> Result<(), QuestlineError> {
    let Some(expected) = expected else {
        return Err(QuestlineError::Unauthorized("Admin API is disabled.".to_string()));
    };

    if !token_matches(provided.unwrap_or(""), expected) {
        return Err(QuestlineError::Unauthorized("Invalid admin token.".to_string()));
    }
    Ok(())
}

fn token_matches(provided: &str, expected: &str) -> bool {
    bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// === Missions ===

pub async fn list_missions(State(state): State<AppState>) -> Result<Json<Vec<Mission>>, ApiError> {
    Ok(Json(state.store.all_missions().await?))
}

pub async fn create_mission(
    State(state): State<AppState>,
    Json(payload): Json<NewMission>,
) -> Result<(StatusCode, Json<Mission>), ApiError> {
    let mission = state.store.create_mission(payload, now()).await?;
    Ok((StatusCode::CREATED, Json(mission)))
}

pub async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Mission>, ApiError> {
    let mission = state
        .store
        .get_mission(id)
        .await?
        .ok_or_else(|| QuestlineError::NotFound("Mission not found.".to_string()))?;
    Ok(Json(mission))
}

pub async fn get_mission_by_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Mission>, ApiError> {
    let mission = state
        .store
        .get_mission_by_key(&key)
        .await?
        .ok_or_else(|| QuestlineError::NotFound("Mission not found.".to_string()))?;
    Ok(Json(mission))
}

pub async fn update_mission(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<MissionUpdate>,
) -> Result<Json<Mission>, ApiError> {
    Ok(Json(state.store.update_mission(id, payload, now()).await?))
}

pub async fn delete_mission(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_mission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionsQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

impl CompletionsQuery {
    /// `(page, per_page)`, at most `COMPLETIONS_PER_PAGE` per page
    fn paging(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(COMPLETIONS_PER_PAGE)
            .clamp(1, COMPLETIONS_PER_PAGE);
        (page, per_page)
    }
}

pub async fn list_completions(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<CompletionsQuery>,
) -> Result<Json<CompletionPage>, ApiError> {
    let (page, per_page) = query.paging();
    Ok(Json(state.store.mission_completions(id, page, per_page).await?))
}

// === Codes ===

/// Code as listed to admins (secret withheld)
#[derive(Serialize)]
pub struct CodeView {
    id: u64,
    mission_id: u64,
    code: String,
    is_active: bool,
    live: bool,
    created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

impl CodeView {
    fn new(code: MissionCode, now: i64) -> Self {
        Self {
            live: code.is_live(now),
            id: code.id,
            mission_id: code.mission_id,
            code: code.code,
            is_active: code.is_active,
            created_at: code.created_at,
            expires_at: code.expires_at,
        }
    }
}

pub async fn list_codes(
    State(state): State<AppState>,
    Path(mission_id): Path<u64>,
) -> Result<Json<Vec<CodeView>>, ApiError> {
    let now = now();
    let codes = state.store.codes(mission_id).await?;
    Ok(Json(codes.into_iter().map(|c| CodeView::new(c, now)).collect()))
}

#[derive(Deserialize)]
pub struct AddCodeRequest {
    code: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Newly issued code. The secret is only returned here.
#[derive(Serialize)]
pub struct IssuedCode {
    #[serde(flatten)]
    view: CodeView,
    secret: Secret,
}

pub async fn add_code(
    State(state): State<AppState>,
    Path(mission_id): Path<u64>,
    Json(payload): Json<AddCodeRequest>,
) -> Result<(StatusCode, Json<IssuedCode>), ApiError> {
    let now = now();
    let record = state
        .store
        .add_code(
            mission_id,
            &payload.code,
            payload.expires_at,
            state.config.totp.secret_length,
            now,
        )
        .await?;

    let secret = record.secret.clone();
    Ok((
        StatusCode::CREATED,
        Json(IssuedCode {
            view: CodeView::new(record, now),
            secret,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ToggleCodeRequest {
    is_active: bool,
}

pub async fn toggle_code(
    State(state): State<AppState>,
    Path(code_id): Path<u64>,
    Json(payload): Json<ToggleCodeRequest>,
) -> Result<Json<CodeView>, ApiError> {
    let record = state.store.set_code_active(code_id, payload.is_active).await?;
    Ok(Json(CodeView::new(record, now())))
}

pub async fn delete_code(
    State(state): State<AppState>,
    Path(code_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_code(code_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Credits ===

/// Body shared by every ledger endpoint
#[derive(Deserialize)]
pub struct LedgerRequest {
    identity: Identity,
    amount: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reference_id: Option<u64>,
}

#[derive(Serialize)]
pub struct LedgerResponse {
    identity: Identity,
    new_balance: i64,
}

impl LedgerResponse {
    fn new(request: LedgerRequest, new_balance: i64) -> Json<Self> {
        Json(Self {
            identity: request.identity,
            new_balance,
        })
    }
}

pub async fn adjust_credits(
    State(state): State<AppState>,
    Json(payload): Json<LedgerRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let new_balance = state
        .ledger
        .adjust(&payload.identity, payload.amount, &payload.description, now())
        .await?;
    Ok(LedgerResponse::new(payload, new_balance))
}

pub async fn purchase_credits(
    State(state): State<AppState>,
    Json(payload): Json<LedgerRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let new_balance = state
        .ledger
        .purchase(
            &payload.identity,
            payload.amount,
            &payload.description,
            payload.reference_id,
            now(),
        )
        .await?;
    Ok(LedgerResponse::new(payload, new_balance))
}

/// Fails with 402 when the balance does not cover `amount`
pub async fn spend_credits(
    State(state): State<AppState>,
    Json(payload): Json<LedgerRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let new_balance = state
        .ledger
        .spend(
            &payload.identity,
            payload.amount,
            &payload.description,
            payload.reference_id,
            now(),
        )
        .await?;
    Ok(LedgerResponse::new(payload, new_balance))
}

pub async fn refund_credits(
    State(state): State<AppState>,
    Json(payload): Json<LedgerRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let new_balance = state
        .ledger
        .refund(
            &payload.identity,
            payload.amount,
            &payload.description,
            payload.reference_id,
            now(),
        )
        .await?;
    Ok(LedgerResponse::new(payload, new_balance))
}

// === Stats ===

#[derive(Serialize)]
pub struct MissionStats {
    id: u64,
    title: String,
    is_active: bool,
    completions: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    service: StatsSnapshot,
    missions: Vec<MissionStats>,
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let all = state.store.all_missions().await?;

    let mut missions = Vec::with_capacity(all.len());
    for mission in all {
        missions.push(MissionStats {
            completions: state.store.completion_count(mission.id).await?,
            id: mission.id,
            title: mission.title,
            is_active: mission.is_active,
        });
    }

    Ok(Json(StatsResponse {
        service: state.stats.snapshot(),
        missions,
    }))
}
