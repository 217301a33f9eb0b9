use axum::{Router, routing::get};

use crate::handlers;
use crate::WebhookState;

pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::verify_webhook).post(handlers::receive_webhook),
        )
        .with_state(state)
}
