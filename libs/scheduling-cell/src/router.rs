use axum::{Router, routing::get};

use crate::handlers;
use crate::SchedulingState;

pub fn appointment_routes(state: SchedulingState) -> Router {
    Router::new()
        .route("/", get(handlers::get_patient_appointments))
        .with_state(state)
}
