use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::services::booking::BookingService;
use crate::SchedulingState;

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    #[serde(alias = "phoneNumber")]
    pub phone_number: String,
}

/// A patient's upcoming appointments, read from the practice-management
/// system and filtered to active statuses.
pub async fn get_patient_appointments(
    State(state): State<SchedulingState>,
    Query(params): Query<AppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let booking = BookingService::new(&state.config, state.directory.clone());

    let appointments = booking
        .patient_appointments(&params.phone_number, None)
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;

    let active: Vec<_> = appointments
        .into_iter()
        .filter(|appointment| appointment.status.is_active())
        .collect();

    Ok(Json(json!({
        "phoneNumber": params.phone_number,
        "appointments": active,
    })))
}
