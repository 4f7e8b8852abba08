// HTTP request handlers for the 8Ball Markets API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::{AppState, SharedState};
use crate::models::*;
use crate::settlement::EngineError;

pub type ApiError = (StatusCode, Json<Value>);

/// Map the engine's error taxonomy onto HTTP statuses. Conflict-class
/// errors (double accept/resolve, wrong lifecycle state) are 409 so
/// clients can distinguish them from plain bad requests.
pub fn error_response(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::InvalidInput(_) | EngineError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
        EngineError::NotTargeted(_) | EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidState(_)
        | EngineError::AlreadyAccepted(_)
        | EngineError::AlreadyResolved(_) => StatusCode::CONFLICT,
        EngineError::StorageConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": err.kind(), "message": err.to_string() })))
}

pub fn lock_state(state: &SharedState) -> Result<std::sync::MutexGuard<'_, AppState>, ApiError> {
    state
        .lock()
        .map_err(|_| error_response(EngineError::StorageConflict("State lock poisoned".to_string())))
}

fn receipt_response(receipt: BetReceipt) -> Json<Value> {
    Json(json!({
        "success": true,
        "bet_id": receipt.bet.bet_id,
        "bet": receipt.bet,
        "ledger_tx_id": receipt.ledger_tx_id,
        "new_balance_cents": receipt.actor_balance_cents,
    }))
}

// ===== SETTLEMENT ENDPOINTS =====

pub async fn propose_bet(
    State(state): State<SharedState>,
    Json(payload): Json<ProposeBetRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let receipt = app.bet_propose(payload).map_err(error_response)?;
    Ok(receipt_response(receipt))
}

pub async fn accept_bet(
    State(state): State<SharedState>,
    Path(bet_id): Path<i64>,
    Json(payload): Json<AcceptBetRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let receipt = app.bet_accept(bet_id, payload).map_err(error_response)?;
    Ok(receipt_response(receipt))
}

pub async fn resolve_bet(
    State(state): State<SharedState>,
    Path(bet_id): Path<i64>,
    Json(payload): Json<ResolveBetRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let receipt = app.bet_resolve(bet_id, payload).map_err(error_response)?;
    Ok(receipt_response(receipt))
}

pub async fn dispute_bet(
    State(state): State<SharedState>,
    Path(bet_id): Path<i64>,
    Json(payload): Json<DisputeBetRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let receipt = app.bet_dispute(bet_id, payload).map_err(error_response)?;
    Ok(receipt_response(receipt))
}

pub async fn cancel_bet(
    State(state): State<SharedState>,
    Path(bet_id): Path<i64>,
    Json(payload): Json<CancelBetRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let receipt = app.bet_cancel_or_expire(bet_id, payload).map_err(error_response)?;
    Ok(receipt_response(receipt))
}

// ===== BALANCE & LEDGER ENDPOINTS =====

pub async fn get_balance(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    let breakdown = app.get_balance(user_id).map_err(error_response)?;
    Ok(Json(json!(breakdown)))
}

pub async fn get_user_ledger(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    if !app.users.contains_key(&user_id) {
        return Err(error_response(EngineError::NotFound(format!("User {} not found", user_id))));
    }
    let entries: Vec<Value> = app
        .ledger
        .entries_for_user(user_id)
        .into_iter()
        .map(|e| json!(e))
        .collect();
    Ok(Json(json!({ "user_id": user_id, "entries": entries })))
}

pub async fn get_ledger_activity(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    Ok(Json(json!({ "activity": app.recent_activity(100) })))
}

// ===== BET LISTING ENDPOINTS =====

#[derive(Debug, Deserialize)]
pub struct BetListQuery {
    #[serde(default)]
    pub status: Option<BetStatus>,
}

pub async fn get_user_bets(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Query(query): Query<BetListQuery>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    let bets = app.list_bets_for_user(user_id, query.status);
    Ok(Json(json!({ "user_id": user_id, "bets": bets })))
}

pub async fn get_arbiter_bets(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    let bets = app.list_bets_for_arbiter(user_id);
    Ok(Json(json!({ "arbiter_id": user_id, "bets": bets })))
}

#[derive(Debug, Deserialize)]
pub struct MarketplaceQuery {
    #[serde(default)]
    pub exclude_user: Option<i64>,
}

pub async fn get_marketplace(
    State(state): State<SharedState>,
    Query(query): Query<MarketplaceQuery>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    let bets = app.marketplace_bets(query.exclude_user);
    Ok(Json(json!({ "bets": bets })))
}

pub async fn get_resolved_bets(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    Ok(Json(json!({ "bets": app.list_resolved_bets() })))
}

pub async fn get_leaderboard(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    Ok(Json(json!({ "leaderboard": app.leaderboard() })))
}

// ===== BET THREAD ENDPOINTS =====

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub actor_id: i64,
}

pub async fn get_bet_thread(
    State(state): State<SharedState>,
    Path(bet_id): Path<i64>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let (thread, messages) = app
        .open_or_create_thread(bet_id, query.actor_id)
        .map_err(error_response)?;
    Ok(Json(json!({ "thread": thread, "messages": messages })))
}

pub async fn post_bet_message(
    State(state): State<SharedState>,
    Path(bet_id): Path<i64>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    let message = app.post_thread_message(bet_id, payload).map_err(error_response)?;
    Ok(Json(json!({ "success": true, "message": message })))
}

// ===== HEALTH =====

pub async fn health_check() -> Json<Value> {
    Json(json!({ "service": "8ball-markets", "status": "ok" }))
}
