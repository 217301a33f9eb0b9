use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==============================================================================
// CLINIC LOCATIONS
// ==============================================================================

/// The two clinic branches. Dentalink sucursales map onto these by name:
/// anything containing "manzanares" is Manzanares, everything else Rodadero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClinicLocation {
    Rodadero,
    Manzanares,
}

impl ClinicLocation {
    pub const ALL: [ClinicLocation; 2] = [ClinicLocation::Rodadero, ClinicLocation::Manzanares];

    pub fn from_branch_name(name: &str) -> Self {
        if name.to_lowercase().contains("manzanares") {
            ClinicLocation::Manzanares
        } else {
            ClinicLocation::Rodadero
        }
    }
}

impl fmt::Display for ClinicLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClinicLocation::Rodadero => write!(f, "rodadero"),
            ClinicLocation::Manzanares => write!(f, "manzanares"),
        }
    }
}

impl FromStr for ClinicLocation {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "rodadero" => Ok(ClinicLocation::Rodadero),
            "manzanares" => Ok(ClinicLocation::Manzanares),
            _ => Err(()),
        }
    }
}

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

/// Closed status enumeration mapped from Dentalink `id_estado` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Cancelled,
    Confirmed,
    Completed,
    Scheduled,
    NoShow,
    Waiting,
    Rescheduled,
}

impl AppointmentStatus {
    /// Dentalink: 1 Anulado, 2 Confirmado, 3 Atendido, 4 Agendado,
    /// 5 No asistió, 6 En espera, 7 No confirmado, 8 Reagendado.
    pub fn from_dentalink(id_estado: i64) -> Self {
        match id_estado {
            1 => AppointmentStatus::Cancelled,
            2 => AppointmentStatus::Confirmed,
            3 => AppointmentStatus::Completed,
            4 => AppointmentStatus::Scheduled,
            5 => AppointmentStatus::NoShow,
            6 => AppointmentStatus::Waiting,
            8 => AppointmentStatus::Rescheduled,
            _ => AppointmentStatus::Scheduled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Waiting => write!(f, "waiting"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

// ==============================================================================
// SLOTS AND APPOINTMENTS
// ==============================================================================

/// One bookable opening. Ephemeral: recomputed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: ClinicLocation,
}

/// Booking request assembled from the extracted appointment fields.
#[derive(Debug, Clone)]
pub struct AppointmentRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: ClinicLocation,
    pub service: Option<String>,
}

/// Appointment as acknowledged by Dentalink, mirrored minimally.
#[derive(Debug, Clone, Serialize)]
pub struct BookedAppointment {
    pub id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub location: ClinicLocation,
    pub service: Option<String>,
    pub status: AppointmentStatus,
    pub patient_name: Option<String>,
}

/// One of a patient's appointments as read back from Dentalink.
#[derive(Debug, Clone, Serialize)]
pub struct PatientAppointment {
    pub id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub location: ClinicLocation,
    pub service: Option<String>,
    pub status: AppointmentStatus,
}

// ==============================================================================
// DENTALINK WIRE TYPES
// ==============================================================================

/// Every Dentalink response wraps its payload in `{"data": …}`.
#[derive(Debug, Deserialize)]
pub struct DentalinkEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DentalinkBranch {
    pub id: i64,
    pub nombre: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DentalinkDentist {
    pub id: i64,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DentalinkPatient {
    pub id: i64,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub apellidos: Option<String>,
    #[serde(default)]
    pub celular: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Agenda row: a schedule opening; `id_paciente == 0` means unassigned.
#[derive(Debug, Clone, Deserialize)]
pub struct DentalinkAgendaRow {
    #[serde(default)]
    pub id_paciente: i64,
    pub hora_inicio: String,
    #[serde(default)]
    pub id_dentista: Option<i64>,
    #[serde(default)]
    pub nombre_dentista: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DentalinkCita {
    pub id: i64,
    #[serde(default)]
    pub fecha: Option<NaiveDate>,
    #[serde(default)]
    pub hora_inicio: Option<String>,
    #[serde(default)]
    pub id_sucursal: Option<i64>,
    #[serde(default)]
    pub id_estado: Option<i64>,
    #[serde(default)]
    pub nombre_paciente: Option<String>,
    #[serde(default)]
    pub nombre_tratamiento: Option<String>,
}

impl DentalinkCita {
    /// "09:00:00" or "09:00" on the wire; only HH:MM is meaningful here.
    pub fn start_time(&self) -> Option<NaiveTime> {
        let raw = self.hora_inicio.as_deref()?;
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Patient not found for {0}")]
    PatientNotFound(String),

    #[error("Could not link patient with Dentalink")]
    PatientLinkFailed,

    #[error("Requested slot is no longer available")]
    SlotTaken,

    #[error("Dentalink is not configured")]
    NotConfigured,

    #[error("Dentalink error: {0}")]
    ExternalService(String),

    #[error("Unexpected Dentalink response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_dentalink_codes() {
        assert_eq!(AppointmentStatus::from_dentalink(1), AppointmentStatus::Cancelled);
        assert_eq!(AppointmentStatus::from_dentalink(2), AppointmentStatus::Confirmed);
        assert_eq!(AppointmentStatus::from_dentalink(3), AppointmentStatus::Completed);
        assert_eq!(AppointmentStatus::from_dentalink(4), AppointmentStatus::Scheduled);
        assert_eq!(AppointmentStatus::from_dentalink(5), AppointmentStatus::NoShow);
        assert_eq!(AppointmentStatus::from_dentalink(6), AppointmentStatus::Waiting);
        // "No confirmado" is the state fresh bookings land in.
        assert_eq!(AppointmentStatus::from_dentalink(7), AppointmentStatus::Scheduled);
        assert_eq!(AppointmentStatus::from_dentalink(8), AppointmentStatus::Rescheduled);
        assert_eq!(AppointmentStatus::from_dentalink(99), AppointmentStatus::Scheduled);
    }

    #[test]
    fn branch_names_map_to_locations() {
        assert_eq!(
            ClinicLocation::from_branch_name("Sede Manzanares Centro"),
            ClinicLocation::Manzanares
        );
        assert_eq!(
            ClinicLocation::from_branch_name("Clínica El Rodadero"),
            ClinicLocation::Rodadero
        );
        assert_eq!(
            ClinicLocation::from_branch_name("Sede Principal"),
            ClinicLocation::Rodadero
        );
    }
}
