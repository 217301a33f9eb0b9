use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use conversation_cell::services::patient::PatientDirectory;
use shared_config::AppConfig;

use crate::models::{
    AppointmentRequest, AppointmentStatus, BookedAppointment, ClinicLocation, PatientAppointment,
    SchedulingError, Slot,
};
use crate::services::availability::AvailabilityService;
use crate::services::dentalink::{DentalinkClient, ESTADO_ANULADO, ESTADO_REAGENDADO};
use crate::services::directory::ClinicDirectory;

const DEFAULT_BOOKING_COMMENT: &str = "Cita agendada via WhatsApp";

pub struct BookingService {
    dentalink: DentalinkClient,
    directory: Arc<ClinicDirectory>,
    availability: AvailabilityService,
    patients: PatientDirectory,
}

impl BookingService {
    pub fn new(config: &AppConfig, directory: Arc<ClinicDirectory>) -> Self {
        Self {
            dentalink: DentalinkClient::new(config),
            availability: AvailabilityService::new(config, Arc::clone(&directory)),
            patients: PatientDirectory::new(config),
            directory,
        }
    }

    /// Resolves the patient's Dentalink id, creating the external record if
    /// needed. The locally cached id short-circuits, so the external
    /// search/create runs at most once per patient.
    pub async fn ensure_dentalink_patient(
        &self,
        phone_number: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<i64, SchedulingError> {
        let local_patient = self.patients.get_by_phone(phone_number).await;

        if let Some(id) = local_patient.as_ref().and_then(|p| p.dentalink_patient_id) {
            debug!("Patient {} already linked to Dentalink ID {}", phone_number, id);
            return Ok(id);
        }

        let mut external = self.dentalink.find_patient_by_phone(phone_number).await?;

        if external.is_none() {
            if let Some(name) = name {
                external = self.dentalink.find_patient_by_name(name).await?;
            }
        }

        let external = match external {
            Some(patient) => patient,
            None => {
                let Some(name) = name else {
                    warn!("Cannot create Dentalink patient for {} without a name", phone_number);
                    return Err(SchedulingError::PatientLinkFailed);
                };
                self.dentalink.create_patient(name, phone_number, email).await?
            }
        };

        if local_patient.is_some() {
            self.patients
                .set_dentalink_patient_id(phone_number, external.id)
                .await;
        }

        Ok(external.id)
    }

    /// Books a confirmed appointment. Identity capture must precede booking:
    /// an unknown phone number fails with `PatientNotFound`. The slot is
    /// re-verified immediately before the create call, so a taken slot is
    /// the expected `SlotTaken` outcome rather than a fault.
    pub async fn create_appointment(
        &self,
        phone_number: &str,
        request: AppointmentRequest,
    ) -> Result<BookedAppointment, SchedulingError> {
        let patient = self
            .patients
            .get_by_phone(phone_number)
            .await
            .ok_or_else(|| SchedulingError::PatientNotFound(phone_number.to_string()))?;

        let dentalink_patient_id = self
            .ensure_dentalink_patient(
                phone_number,
                patient.name.as_deref(),
                patient.email.as_deref(),
            )
            .await?;

        let slot = Slot {
            date: request.date,
            time: request.time,
            location: request.location,
        };
        if !self.availability.is_slot_available(&slot).await {
            info!(
                "Slot {} {} at {} no longer available",
                request.date, request.time, request.location
            );
            return Err(SchedulingError::SlotTaken);
        }

        let snapshot = self.directory.get_or_refresh().await?;
        let dentist_id = snapshot
            .default_dentist_id
            .ok_or(SchedulingError::NotConfigured)?;
        let branch_id = snapshot
            .branch_for(request.location)
            .ok_or(SchedulingError::NotConfigured)?;

        let comment = request.service.as_deref().unwrap_or(DEFAULT_BOOKING_COMMENT);

        let cita = self
            .dentalink
            .create_cita(
                dentalink_patient_id,
                dentist_id,
                branch_id,
                request.date,
                request.time,
                comment,
            )
            .await?;

        info!(
            "Appointment created in Dentalink: {} {} at {} (ID {})",
            request.date, request.time, request.location, cita.id
        );

        Ok(BookedAppointment {
            id: cita.id,
            appointment_date: request.date,
            appointment_time: request.time,
            location: request.location,
            service: request.service,
            status: cita
                .id_estado
                .map(AppointmentStatus::from_dentalink)
                .unwrap_or(AppointmentStatus::Scheduled),
            patient_name: cita.nombre_paciente,
        })
    }

    /// Moves an appointment to a new slot after re-validating availability.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: i64,
        new_date: chrono::NaiveDate,
        new_time: chrono::NaiveTime,
        location: Option<ClinicLocation>,
    ) -> Result<BookedAppointment, SchedulingError> {
        let location = location.unwrap_or(ClinicLocation::Rodadero);

        let slot = Slot {
            date: new_date,
            time: new_time,
            location,
        };
        if !self.availability.is_slot_available(&slot).await {
            info!("Reschedule target {} {} at {} not available", new_date, new_time, location);
            return Err(SchedulingError::SlotTaken);
        }

        let snapshot = self.directory.get_or_refresh().await?;
        let branch_id = snapshot
            .branch_for(location)
            .ok_or(SchedulingError::NotConfigured)?;

        let update = json!({
            "fecha": new_date.format("%Y-%m-%d").to_string(),
            "hora_inicio": new_time.format("%H:%M").to_string(),
            "id_sucursal": branch_id,
            "id_estado": ESTADO_REAGENDADO,
        });

        let cita = self.dentalink.update_cita(appointment_id, update).await?;
        info!("Appointment {} rescheduled in Dentalink", appointment_id);

        Ok(BookedAppointment {
            id: cita.id,
            appointment_date: new_date,
            appointment_time: new_time,
            location,
            service: None,
            status: AppointmentStatus::Rescheduled,
            patient_name: cita.nombre_paciente,
        })
    }

    /// Cancels by status update alone; freeing a slot needs no re-validation.
    pub async fn cancel_appointment(
        &self,
        appointment_id: i64,
    ) -> Result<AppointmentStatus, SchedulingError> {
        let update = json!({ "id_estado": ESTADO_ANULADO });

        self.dentalink.update_cita(appointment_id, update).await?;
        info!("Appointment {} cancelled in Dentalink", appointment_id);

        Ok(AppointmentStatus::Cancelled)
    }

    /// A patient's appointments read back from Dentalink, mapped to the
    /// local shape. Unknown phone numbers simply have no appointments.
    pub async fn patient_appointments(
        &self,
        phone_number: &str,
        status_filter: Option<AppointmentStatus>,
    ) -> Result<Vec<PatientAppointment>, SchedulingError> {
        let patient_id = match self
            .patients
            .get_by_phone(phone_number)
            .await
            .and_then(|patient| patient.dentalink_patient_id)
        {
            Some(id) => id,
            None => match self.dentalink.find_patient_by_phone(phone_number).await? {
                Some(external) => external.id,
                None => return Ok(Vec::new()),
            },
        };

        let snapshot = self.directory.get_or_refresh().await?;
        let citas = self.dentalink.patient_citas(patient_id).await?;

        let appointments = citas
            .into_iter()
            .filter_map(|cita| {
                let date = cita.fecha?;
                let time = cita.start_time()?;
                let location = cita
                    .id_sucursal
                    .map(|branch_id| snapshot.location_for(branch_id))
                    .unwrap_or(ClinicLocation::Rodadero);
                let status = cita
                    .id_estado
                    .map(AppointmentStatus::from_dentalink)
                    .unwrap_or(AppointmentStatus::Scheduled);

                Some(PatientAppointment {
                    id: cita.id,
                    appointment_date: date,
                    appointment_time: time,
                    location,
                    service: cita.nombre_tratamiento,
                    status,
                })
            })
            .filter(|appointment| {
                status_filter.is_none_or(|wanted| appointment.status == wanted)
            })
            .collect();

        Ok(appointments)
    }
}
