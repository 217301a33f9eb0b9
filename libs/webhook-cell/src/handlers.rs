use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};

use crate::models::{VerifyQuery, WebhookPayload};
use crate::services::dispatcher::MessageDispatcher;
use crate::WebhookState;

/// Subscription verification: echo the challenge when the token matches.
pub async fn verify_webhook(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let expected = &state.config.whatsapp_verify_token;

    if params.mode == "subscribe" && !expected.is_empty() && params.verify_token == *expected {
        info!("Webhook verified");
        (StatusCode::OK, params.challenge)
    } else {
        warn!("Webhook verification failed");
        (StatusCode::FORBIDDEN, "Forbidden".to_string())
    }
}

/// Message delivery. Replies 200 EVENT_RECEIVED once processing finishes;
/// unrecognized envelopes get a 404 so the platform stops retrying them.
pub async fn receive_webhook(
    State(state): State<WebhookState>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, String) {
    if !payload.is_whatsapp() {
        warn!("Unrecognized webhook object: {:?}", payload.object);
        return (StatusCode::NOT_FOUND, "Not Found".to_string());
    }

    let dispatcher = MessageDispatcher::new(&state.config, state.directory.clone());
    dispatcher.dispatch(&payload).await;

    (StatusCode::OK, "EVENT_RECEIVED".to_string())
}
