use anyhow::{Result, anyhow};
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, PatientInput};

/// Computes the update payload for an existing patient: only fields the
/// record is still missing are included, so known-good data is never
/// overwritten by a later extraction.
pub fn missing_fields_update(existing: &Patient, input: &PatientInput) -> Map<String, Value> {
    let mut update = Map::new();

    if existing.name.is_none() {
        if let Some(name) = &input.name {
            update.insert("name".to_string(), json!(name));
        }
    }
    if existing.document.is_none() {
        if let Some(document) = &input.document {
            update.insert("document".to_string(), json!(document));
        }
    }
    if existing.email.is_none() {
        if let Some(email) = &input.email {
            update.insert("email".to_string(), json!(email));
        }
    }

    update
}

pub struct PatientDirectory {
    supabase: SupabaseClient,
}

impl PatientDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Looks a patient up by phone number. Absence is not an error; a store
    /// failure is logged and also answers `None`.
    pub async fn get_by_phone(&self, phone_number: &str) -> Option<Patient> {
        let path = format!("/rest/v1/patients?phone_number=eq.{}&limit=1", phone_number);

        let result: Result<Vec<Patient>> = self.supabase.request(Method::GET, &path, None).await;

        match result {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!("Failed to fetch patient {}: {}", phone_number, e);
                None
            }
        }
    }

    /// Creates the patient if absent; otherwise fills in only the fields the
    /// record is still missing. Returns the row as stored.
    pub async fn upsert(&self, phone_number: &str, input: &PatientInput) -> Result<Patient> {
        if let Some(existing) = self.get_by_phone(phone_number).await {
            let mut update = missing_fields_update(&existing, input);
            if update.is_empty() {
                debug!("Patient {} already has all provided fields", phone_number);
                return Ok(existing);
            }
            update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

            let patient = self.patch(phone_number, Value::Object(update)).await?;
            info!("Patient updated: {}", phone_number);
            return Ok(patient);
        }

        let body = json!({
            "phone_number": phone_number,
            "name": input.name,
            "document": input.document,
            "email": input.email,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Patient> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/patients", Some(body), Some(headers))
            .await?;

        let patient = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to create patient {}", phone_number))?;

        info!("Patient created: {}", phone_number);
        Ok(patient)
    }

    /// Persists the external practice-management id on the local row. Callers
    /// check the cached id first, so this runs at most once per patient.
    pub async fn set_dentalink_patient_id(&self, phone_number: &str, dentalink_id: i64) {
        let update = json!({
            "dentalink_patient_id": dentalink_id,
            "updated_at": Utc::now().to_rfc3339(),
        });

        match self.patch(phone_number, update).await {
            Ok(_) => info!("Synced Dentalink ID {} for {}", dentalink_id, phone_number),
            Err(e) => error!("Failed to sync Dentalink ID for {}: {}", phone_number, e),
        }
    }

    async fn patch(&self, phone_number: &str, update: Value) -> Result<Patient> {
        let path = format!("/rest/v1/patients?phone_number=eq.{}", phone_number);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Patient> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(update), Some(headers))
            .await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Patient {} not found for update", phone_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(name: Option<&str>, document: Option<&str>, email: Option<&str>) -> Patient {
        Patient {
            phone_number: "573001112233".to_string(),
            name: name.map(String::from),
            document: document.map(String::from),
            email: email.map(String::from),
            dentalink_patient_id: None,
            updated_at: None,
        }
    }

    #[test]
    fn fills_only_missing_fields() {
        let existing = patient(Some("Ana Pérez"), None, None);
        let input = PatientInput {
            name: Some("Otra Persona".to_string()),
            document: Some("12345678".to_string()),
            email: Some("ana@example.com".to_string()),
        };

        let update = missing_fields_update(&existing, &input);

        assert!(!update.contains_key("name"));
        assert_eq!(update.get("document"), Some(&json!("12345678")));
        assert_eq!(update.get("email"), Some(&json!("ana@example.com")));
    }

    #[test]
    fn empty_update_when_record_is_complete() {
        let existing = patient(Some("Ana Pérez"), Some("12345678"), Some("ana@example.com"));
        let input = PatientInput {
            name: Some("Nuevo Nombre".to_string()),
            document: Some("99999999".to_string()),
            email: Some("nuevo@example.com".to_string()),
        };

        assert!(missing_fields_update(&existing, &input).is_empty());
    }

    #[test]
    fn empty_update_when_input_has_nothing_new() {
        let existing = patient(None, None, None);
        let input = PatientInput::default();

        assert!(missing_fields_update(&existing, &input).is_empty());
    }
}
