use std::sync::Arc;

use shared_config::AppConfig;

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod time;

pub use models::*;
pub use router::appointment_routes;

use services::directory::ClinicDirectory;

/// Shared state for scheduling routes: the config plus the long-lived
/// branch/dentist directory cache.
#[derive(Clone)]
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<ClinicDirectory>,
}
