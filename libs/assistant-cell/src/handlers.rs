use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::extractor::verify_api_key;

use crate::models::AssistantError;
use crate::services::config::BotConfigService;

fn map_error(e: AssistantError) -> AppError {
    match e {
        AssistantError::NotFound(key) => {
            AppError::NotFound(format!("Configuración no encontrada: {}", key))
        }
        AssistantError::DuplicateKey(_) => {
            AppError::Conflict("La clave ya existe. Usa PUT para actualizar.".to_string())
        }
        other => AppError::Database(other.to_string()),
    }
}

// ==============================================================================
// BOT PROMPT
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateBotPromptRequest {
    pub prompt: Option<String>,
    pub description: Option<String>,
    pub updated_by: Option<String>,
}

pub async fn get_bot_prompt(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let service = BotConfigService::new(&state);
    let row = service.get_bot_prompt_row().await.map_err(map_error)?;
    Ok(Json(json!(row)))
}

pub async fn update_bot_prompt(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    Json(request): Json<UpdateBotPromptRequest>,
) -> Result<Json<Value>, AppError> {
    verify_api_key(&state, &headers)?;

    let Some(prompt) = request.prompt else {
        return Err(AppError::BadRequest("Se requiere el campo \"prompt\"".to_string()));
    };

    let service = BotConfigService::new(&state);
    let row = service
        .update_bot_prompt(
            &prompt,
            request.description.as_deref(),
            request.updated_by.as_deref(),
        )
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "success": true, "data": row })))
}

// ==============================================================================
// AI CONFIG
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ConfigKeyQuery {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigWriteRequest {
    pub key: Option<String>,
    pub value: Option<Value>,
    pub description: Option<String>,
    pub updated_by: Option<String>,
}

/// Without `?key=` returns the whole bundle keyed by section; with it, the
/// single row.
pub async fn get_ai_config(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<ConfigKeyQuery>,
) -> Result<Json<Value>, AppError> {
    let service = BotConfigService::new(&state);

    if let Some(key) = params.key {
        let entry = service.get_config_entry(&key).await.map_err(map_error)?;
        return Ok(Json(json!(entry)));
    }

    let bundle = service.get_ai_config().await;
    let mut body = Map::new();
    for (key, entry) in bundle {
        body.insert(
            key,
            json!({
                "value": entry.value,
                "description": entry.description,
                "updated_at": entry.updated_at,
                "updated_by": entry.updated_by,
            }),
        );
    }

    Ok(Json(Value::Object(body)))
}

pub async fn update_ai_config(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    Query(params): Query<ConfigKeyQuery>,
    Json(request): Json<ConfigWriteRequest>,
) -> Result<Json<Value>, AppError> {
    verify_api_key(&state, &headers)?;

    let Some(key) = params.key.or(request.key) else {
        return Err(AppError::BadRequest("Se requiere el parámetro \"key\"".to_string()));
    };
    let Some(value) = request.value else {
        return Err(AppError::BadRequest("Se requiere el campo \"value\"".to_string()));
    };

    let service = BotConfigService::new(&state);
    let entry = service
        .upsert_config_entry(
            &key,
            value,
            request.description.as_deref(),
            request.updated_by.as_deref(),
        )
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "success": true, "data": entry })))
}

pub async fn create_ai_config(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    Json(request): Json<ConfigWriteRequest>,
) -> Result<Json<Value>, AppError> {
    verify_api_key(&state, &headers)?;

    let (Some(key), Some(value)) = (request.key, request.value) else {
        return Err(AppError::BadRequest(
            "Se requieren los campos \"key\" y \"value\"".to_string(),
        ));
    };

    let service = BotConfigService::new(&state);
    let entry = service
        .create_config_entry(
            &key,
            value,
            request.description.as_deref(),
            request.updated_by.as_deref(),
        )
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "success": true, "data": entry })))
}
