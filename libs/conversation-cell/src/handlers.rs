use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::services::store::ConversationStore;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Lists conversations grouped by phone number, most recent first.
pub async fn list_conversations(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(20);
    let offset = params.offset.unwrap_or(0);

    let store = ConversationStore::new(&state);
    let (total, conversations) = store
        .list_conversations(limit, offset)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "total": total,
        "limit": limit,
        "offset": offset,
        "conversations": conversations,
    })))
}

/// Returns one conversation's messages, newest first.
pub async fn get_conversation(
    State(state): State<Arc<AppConfig>>,
    Path(phone_number): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);

    let store = ConversationStore::new(&state);
    let messages = store
        .page_messages(&phone_number, limit, offset)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "phoneNumber": phone_number,
        "limit": limit,
        "offset": offset,
        "messages": messages,
    })))
}
