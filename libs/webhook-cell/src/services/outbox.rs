use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use assistant_cell::services::intent::IntentExtractor;
use conversation_cell::models::{ChatTurn, PatientInput};
use conversation_cell::services::patient::PatientDirectory;
use conversation_cell::services::store::ConversationStore;
use scheduling_cell::models::{AppointmentRequest, ClinicLocation, SchedulingError};
use scheduling_cell::services::booking::BookingService;
use scheduling_cell::services::directory::ClinicDirectory;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{BookingIntent, IntentStatus, WebhookError};

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);
const ERROR_BACKOFF: Duration = Duration::from_secs(15);
const HISTORY_WINDOW: usize = 20;

/// Persistence for pending booking intents, one Supabase table.
pub struct BookingOutbox {
    supabase: SupabaseClient,
}

impl BookingOutbox {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Records a pending intent. Called before the reply is sent, so a
    /// crash between reply and processing cannot lose the booking.
    pub async fn enqueue(&self, phone_number: &str, user_message: &str) -> Result<Uuid, WebhookError> {
        let id = Uuid::new_v4();
        let body = json!({
            "id": id,
            "phone_number": phone_number,
            "user_message": user_message,
            "status": IntentStatus::Pending.to_string(),
        });

        self.supabase
            .request_with_headers::<Vec<serde_json::Value>>(
                Method::POST,
                "/rest/v1/booking_intents",
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| WebhookError::Outbox(e.to_string()))?;

        debug!("Booking intent {} enqueued for {}", id, phone_number);
        Ok(id)
    }

    /// Oldest pending intent, if any.
    pub async fn next_pending(&self) -> Result<Option<BookingIntent>, WebhookError> {
        let path =
            "/rest/v1/booking_intents?status=eq.pending&order=created_at.asc&limit=1";
        let rows: Vec<BookingIntent> = self
            .supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| WebhookError::Outbox(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    pub async fn mark(
        &self,
        intent_id: Uuid,
        status: IntentStatus,
        error: Option<&str>,
    ) -> Result<(), WebhookError> {
        let path = format!("/rest/v1/booking_intents?id=eq.{}", intent_id);
        let body = json!({
            "status": status.to_string(),
            "error": error,
            "processed_at": Utc::now().to_rfc3339(),
        });

        self.supabase
            .request_with_headers::<Vec<serde_json::Value>>(
                Method::PATCH,
                &path,
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| WebhookError::Outbox(e.to_string()))?;

        Ok(())
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }
}

/// Long-lived worker draining the outbox: name capture for unregistered
/// patients, booking-intent extraction, and appointment creation, with the
/// outcome recorded on each intent row.
pub struct OutboxWorker {
    outbox: BookingOutbox,
    store: ConversationStore,
    patients: PatientDirectory,
    extractor: IntentExtractor,
    booking: BookingService,
}

impl OutboxWorker {
    pub fn new(config: &AppConfig, directory: Arc<ClinicDirectory>) -> Self {
        Self {
            outbox: BookingOutbox::new(config),
            store: ConversationStore::new(config),
            patients: PatientDirectory::new(config),
            extractor: IntentExtractor::new(config),
            booking: BookingService::new(config, directory),
        }
    }

    pub async fn run(self) {
        info!("Booking outbox worker started");

        loop {
            match self.outbox.next_pending().await {
                Ok(Some(intent)) => {
                    if let Err(e) = self
                        .outbox
                        .mark(intent.id, IntentStatus::Processing, None)
                        .await
                    {
                        error!("Failed to claim intent {}: {}", intent.id, e);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                        continue;
                    }

                    match self.process_intent(&intent).await {
                        Ok(outcome) => {
                            info!("Intent {} completed: {}", intent.id, outcome);
                            let _ = self
                                .outbox
                                .mark(intent.id, IntentStatus::Completed, Some(&outcome))
                                .await;
                        }
                        Err(reason) => {
                            warn!("Intent {} failed: {}", intent.id, reason);
                            let _ = self
                                .outbox
                                .mark(intent.id, IntentStatus::Failed, Some(&reason))
                                .await;
                        }
                    }
                }
                Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                Err(e) => {
                    error!("Outbox poll failed: {}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// One intent end to end. `Ok` carries a human-readable outcome for the
    /// row; `Err` the failure reason.
    pub async fn process_intent(&self, intent: &BookingIntent) -> Result<String, String> {
        let phone = &intent.phone_number;
        let message = &intent.user_message;

        let patient = self.patients.get_by_phone(phone).await;
        let is_registered = patient
            .as_ref()
            .is_some_and(|patient| patient.is_registered());

        // Registration flow: capture the name from a self-introduction.
        if !is_registered && IntentExtractor::might_be_providing_name(message) {
            if let Some(name) = self.extractor.extract_name(message).await {
                let input = PatientInput {
                    name: Some(name.clone()),
                    document: None,
                    email: None,
                };
                match self.patients.upsert(phone, &input).await {
                    Ok(_) => info!("Name captured for {}: {}", phone, name),
                    Err(e) => warn!("Failed to save captured name for {}: {}", phone, e),
                }
            }
        }

        let history = self.conversation_before_current(phone, message).await;
        let signal = self.extractor.detect_booking(&history, message).await;

        if !signal.is_booking {
            return Ok("no booking confirmation detected".to_string());
        }

        info!("Booking confirmation detected for {}", phone);

        if let Some(info) = &signal.patient_info {
            let needs_data = self
                .patients
                .get_by_phone(phone)
                .await
                .map_or(true, |patient| !patient.has_complete_identity());
            if needs_data {
                if let Err(e) = self.patients.upsert(phone, info).await {
                    warn!("Failed to upsert patient data for {}: {}", phone, e);
                }
            }
        }

        let Some(details) = signal.appointment_info else {
            return Ok("booking confirmed but appointment info missing".to_string());
        };
        let (Some(date), Some(time)) = (details.date, details.time) else {
            return Ok(format!(
                "incomplete appointment info (date: {:?}, time: {:?})",
                details.date, details.time
            ));
        };

        let request = AppointmentRequest {
            date,
            time,
            location: details.location.unwrap_or(ClinicLocation::Rodadero),
            service: details.service,
        };

        match self.booking.create_appointment(phone, request).await {
            Ok(appointment) => Ok(format!(
                "appointment {} created for {} {}",
                appointment.id, date, time
            )),
            Err(SchedulingError::SlotTaken) => Err("slot no longer available".to_string()),
            Err(SchedulingError::PatientNotFound(_)) => {
                Err("patient identity not captured before booking".to_string())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// History as it stood before the current turn was appended, so the
    /// extractor sees the proposal/confirmation exchange, not its own echo.
    async fn conversation_before_current(&self, phone: &str, message: &str) -> Vec<ChatTurn> {
        let mut history = self.store.get_history(phone, HISTORY_WINDOW).await;

        if history.len() >= 2 && history[history.len() - 2].content == *message {
            history.truncate(history.len() - 2);
        }

        history
    }
}
