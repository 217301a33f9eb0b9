use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use shared_config::AppConfig;

use crate::handlers;

/// Admin configuration surface. Writes check the shared secret inside the
/// handlers; reads are open, as in the legacy deployment.
pub fn config_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route(
            "/bot-prompt",
            get(handlers::get_bot_prompt).put(handlers::update_bot_prompt),
        )
        .route(
            "/ai-config",
            get(handlers::get_ai_config)
                .put(handlers::update_ai_config)
                .post(handlers::create_ai_config),
        )
        .with_state(state)
}
