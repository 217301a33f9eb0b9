use std::sync::Arc;

use scheduling_cell::services::directory::ClinicDirectory;
use shared_config::AppConfig;

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::webhook_routes;

/// Shared state for the webhook routes: config plus the long-lived
/// branch/dentist directory the booking path reads through.
#[derive(Clone)]
pub struct WebhookState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<ClinicDirectory>,
}
