use std::sync::Arc;

use axum::{Router, routing::get};

use shared_config::AppConfig;

use crate::handlers;

pub fn conversation_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_conversations))
        .route("/{phone_number}", get(handlers::get_conversation))
        .with_state(state)
}
