use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use assistant_cell::router::config_routes;
use conversation_cell::router::conversation_routes;
use scheduling_cell::router::appointment_routes;
use scheduling_cell::services::directory::ClinicDirectory;
use scheduling_cell::SchedulingState;
use shared_config::AppConfig;
use webhook_cell::router::webhook_routes;
use webhook_cell::WebhookState;

pub fn create_router(config: Arc<AppConfig>, directory: Arc<ClinicDirectory>) -> Router {
    let webhook_state = WebhookState {
        config: Arc::clone(&config),
        directory: Arc::clone(&directory),
    };
    let scheduling_state = SchedulingState {
        config: Arc::clone(&config),
        directory,
    };

    Router::new()
        .route("/", get(|| async { "Clinic assistant API is running!" }))
        .nest("/webhook", webhook_routes(webhook_state))
        .nest("/conversations", conversation_routes(Arc::clone(&config)))
        .nest("/appointments", appointment_routes(scheduling_state))
        .merge(config_routes(config))
}
