//! HTTP API endpoints.
//!
//! `/api` is what the game client talks to. `/internal` is for the sign-in
//! and anti-abuse collaborators and for operators, behind Basic auth.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::abuse::{api_abuse_middleware, AbuseConfig};
use crate::auth::{internal_auth_middleware, AuthConfig};
use crate::config::MAX_PAGE_SIZE;
use crate::error::{EngineError, EngineResult};
use crate::protocol::*;
use crate::state::export::StateSnapshot;
use crate::state::AppState;
use crate::types::*;

/// Build the full application router
pub fn router(state: Arc<AppState>, auth: Arc<AuthConfig>, abuse: Arc<AbuseConfig>) -> Router {
    let api = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(session_recap))
        .route("/sessions/{session_id}/finalize", post(finalize_session))
        .route("/rounds/{round_id}/answer", post(submit_answer))
        .route("/leaderboard", get(leaderboard))
        .route("/players/{owner_id}", get(player_history))
        .layer(middleware::from_fn_with_state(abuse, api_abuse_middleware));

    let internal = Router::new()
        .route("/sessions/{session_id}/validity", post(set_validity))
        .route("/identities/merge", post(merge_identity))
        .route("/players/{owner_id}", put(upsert_profile))
        .route("/rankings/rebuild", post(rebuild_rankings))
        .route("/state/export", get(export_state))
        .route("/state/import", post(import_state))
        .layer(middleware::from_fn_with_state(auth, internal_auth_middleware));

    Router::new()
        .nest("/api", api)
        .nest("/internal", internal)
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// POST /api/sessions
///
/// The body is optional; without an `ownerId` the session gets a fresh
/// anonymous identity.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> EngineResult<(StatusCode, Json<NewSessionResponse>)> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        NewSessionRequest::default()
    } else {
        serde_json::from_slice::<NewSessionRequest>(&body)
            .map_err(|e| EngineError::InvalidInput(format!("Malformed request body: {}", e)))?
    };

    let created = state.new_session(request.owner_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/rounds/{round_id}/answer
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<RoundId>,
    Json(request): Json<AnswerRequest>,
) -> EngineResult<Json<Outcome>> {
    state
        .submit_answer(&round_id, &request.choice_id)
        .await
        .map(Json)
}

/// POST /api/sessions/{session_id}/finalize
///
/// Returns the player's window on the score board.
pub async fn finalize_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> EngineResult<Json<Vec<RankedEntry>>> {
    state.finalize_session(&session_id).await.map(Json)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub board: Board,
    /// Set for paged queries, absent for a relative window
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub entries: Vec<RankedEntry>,
}

/// GET /api/leaderboard?owner_id=&page=&page_size=&board=
///
/// With `owner_id` this is the window around that player; otherwise a
/// 1-based page from the top.
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> EngineResult<Json<LeaderboardResponse>> {
    if let Some(owner_id) = query.owner_id.as_deref().filter(|id| !id.is_empty()) {
        let entries = state.relative_leaderboard(owner_id, query.board).await?;
        return Ok(Json(LeaderboardResponse {
            board: query.board,
            page: None,
            page_size: None,
            entries,
        }));
    }

    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(EngineError::InvalidInput("page starts at 1".to_string()));
    }
    let page_size = query.page_size.unwrap_or(state.config.page_size);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(EngineError::InvalidInput(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| EngineError::InvalidInput("page is out of range".to_string()))?;

    let entries = state
        .leaderboard_page(query.board, offset, page_size)
        .await?;
    Ok(Json(LeaderboardResponse {
        board: query.board,
        page: Some(page),
        page_size: Some(page_size),
        entries,
    }))
}

/// GET /api/sessions/{session_id}
pub async fn session_recap(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> EngineResult<Json<SessionRecap>> {
    state.session_recap(&session_id).await.map(Json)
}

/// GET /api/players/{owner_id}
pub async fn player_history(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<OwnerId>,
) -> EngineResult<Json<PlayerHistory>> {
    state.player_history(&owner_id).await.map(Json)
}

/// POST /internal/sessions/{session_id}/validity
pub async fn set_validity(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<ValidityRequest>,
) -> EngineResult<Json<Session>> {
    state
        .set_validity(&session_id, request.valid)
        .await
        .map(Json)
}

/// POST /internal/identities/merge
pub async fn merge_identity(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MergeRequest>,
) -> EngineResult<Json<MergeReport>> {
    state
        .merge_identity(&request.from_id, &request.to_id)
        .await
        .map(Json)
}

/// PUT /internal/players/{owner_id}
pub async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<OwnerId>,
    Json(profile): Json<Profile>,
) -> EngineResult<Json<Profile>> {
    state.upsert_profile(&owner_id, profile).await.map(Json)
}

/// POST /internal/rankings/rebuild
pub async fn rebuild_rankings(
    State(state): State<Arc<AppState>>,
) -> EngineResult<Json<RebuildReport>> {
    state.rebuild_rankings().await.map(Json)
}

/// GET /internal/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<StateSnapshot> {
    Json(state.export_state().await)
}

/// POST /internal/state/import
///
/// Replaces all sessions, rounds and profiles, then rebuilds the boards.
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<StateSnapshot>,
) -> EngineResult<Json<RebuildReport>> {
    state.import_state(snapshot).await.map(Json)
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub resources: usize,
    pub rank_store: String,
}

/// GET /healthz
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        resources: state.catalog.len(),
        rank_store: state.rankings.name().to_string(),
    })
}
