use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub user_id: i64,
    pub api_token: String,
}

/// Registers a username and hands back an opaque bearer token. Credential
/// mechanics beyond this (passwords, expiry) live outside this service.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, AppError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("username must not be empty".to_string()));
    }

    let db = state.db.lock().unwrap();
    if queries::get_user_by_username(&db, username)?.is_some() {
        return Err(AppError::Conflict("username already registered".to_string()));
    }

    let token = uuid::Uuid::new_v4().to_string();
    let user = queries::create_user(&db, username, &token)?;

    tracing::info!(user_id = user.id, username, "user registered");

    Ok(Json(SignupResponse {
        user_id: user.id,
        api_token: user.api_token,
    }))
}

/// Resolves the caller from the Authorization header.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let db = state.db.lock().unwrap();
    queries::get_user_by_token(&db, token)?.ok_or(AppError::Unauthorized)
}
