use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth;
use crate::models::{ChatResponse, Conversation};
use crate::services::chat as conversation;
use crate::services::rules::BookingDeps;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub response: ChatResponse,
}

// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let user = auth::require_user(&state, &headers)?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }

    let deps = BookingDeps::new(Local::now().naive_local(), &state.config);

    let mut conv = {
        let db = state.db.lock().unwrap();
        queries::get_conversation(&db, user.id, &deps.now)?
    }
    .unwrap_or_else(|| Conversation::new(user.id, deps.now));

    let response = conversation::handle_turn(&state, &user, &mut conv, message, &deps).await?;

    {
        let db = state.db.lock().unwrap();
        queries::save_conversation(&db, &conv)?;
    }

    Ok(Json(ChatReply { response }))
}
