// Authentication and account administration endpoints.
//
// Signup grants the fixed starting balance through the ledger. Admin role
// changes go through an explicit admin-only grant endpoint; there is no
// in-band unlock password.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::app_state::SharedState;
use crate::handlers::{error_response, lock_state, ApiError};
use crate::settlement::{access, EngineError};

/// Salted SHA-256 digest of the password, hex-encoded
pub fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", username.trim().to_lowercase(), password).as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminActiveRequest {
    pub actor_id: i64,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdminGrantRequest {
    pub actor_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub actor_id: i64,
}

fn user_summary(user: &crate::models::User, balance_cents: i64) -> Value {
    json!({
        "user_id": user.user_id,
        "username": user.username,
        "is_admin": user.is_admin,
        "is_active": user.is_active,
        "balance_cents": balance_cents,
    })
}

// ===== AUTH ENDPOINTS =====

pub async fn signup(
    State(state): State<SharedState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<Value>, ApiError> {
    if payload.password.len() < 4 {
        return Err(error_response(EngineError::InvalidInput(
            "Password must be at least 4 characters".to_string(),
        )));
    }

    let mut app = lock_state(&state)?;
    let hash = hash_password(&payload.username, &payload.password);
    let user = app.create_user(&payload.username, &hash).map_err(error_response)?;
    let balance = app.ledger.available_balance(user.user_id);

    Ok(Json(json!({ "success": true, "user": user_summary(&user, balance) })))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;

    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "UNAUTHORIZED", "message": "Invalid username or password" })),
        )
    };

    let user = app.find_user_by_name(&payload.username).ok_or_else(unauthorized)?;
    if user.password_hash != hash_password(&payload.username, &payload.password) {
        return Err(unauthorized());
    }
    if !user.is_active {
        return Err(error_response(EngineError::Forbidden(format!(
            "Account {} is deactivated",
            user.username
        ))));
    }

    let balance = app.ledger.available_balance(user.user_id);
    tracing::info!(user_id = user.user_id, "login");
    Ok(Json(json!({ "success": true, "user": user_summary(user, balance) })))
}

// ===== ADMIN ENDPOINTS =====

fn require_admin(
    app: &crate::app_state::AppState,
    actor_id: i64,
) -> Result<(), ApiError> {
    let actor = access::resolve_actor(&app.users, actor_id).map_err(error_response)?;
    if !actor.is_admin {
        return Err(error_response(EngineError::Forbidden(format!(
            "User {} is not an admin",
            actor_id
        ))));
    }
    Ok(())
}

pub async fn set_user_active(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<AdminActiveRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    require_admin(&app, payload.actor_id)?;

    let user = app
        .users
        .get_mut(&user_id)
        .ok_or_else(|| error_response(EngineError::NotFound(format!("User {} not found", user_id))))?;
    user.is_active = payload.active;
    let user = user.clone();
    let summary = user_summary(&user, app.ledger.available_balance(user_id));

    tracing::info!(user_id, active = payload.active, admin = payload.actor_id, "active flag changed");
    app.log_activity(
        "🔐",
        if payload.active { "ACTIVATE" } else { "DEACTIVATE" },
        &format!("admin {} set user {} active={}", payload.actor_id, user_id, payload.active),
    );
    Ok(Json(json!({ "success": true, "user": summary })))
}

pub async fn grant_admin(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<AdminGrantRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut app = lock_state(&state)?;
    require_admin(&app, payload.actor_id)?;

    let user = app
        .users
        .get_mut(&user_id)
        .ok_or_else(|| error_response(EngineError::NotFound(format!("User {} not found", user_id))))?;
    user.is_admin = true;
    let user = user.clone();
    let summary = user_summary(&user, app.ledger.available_balance(user_id));

    tracing::info!(user_id, admin = payload.actor_id, "admin granted");
    app.log_activity(
        "🔐",
        "GRANT_ADMIN",
        &format!("admin {} granted admin to user {}", payload.actor_id, user_id),
    );
    Ok(Json(json!({ "success": true, "user": summary })))
}

pub async fn list_users(
    State(state): State<SharedState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Value>, ApiError> {
    let app = lock_state(&state)?;
    require_admin(&app, query.actor_id)?;

    let mut users: Vec<Value> = app
        .users
        .values()
        .map(|u| user_summary(u, app.ledger.available_balance(u.user_id)))
        .collect();
    users.sort_by_key(|u| u["user_id"].as_i64().unwrap_or(0));
    Ok(Json(json!({ "users": users })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_salted_by_username() {
        let a = hash_password("alice", "hunter2");
        let b = hash_password("alice", "hunter2");
        let c = hash_password("bob", "hunter2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
