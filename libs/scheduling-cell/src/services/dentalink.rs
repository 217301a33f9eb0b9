use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use shared_config::AppConfig;

use crate::models::{
    DentalinkAgendaRow, DentalinkBranch, DentalinkCita, DentalinkDentist, DentalinkEnvelope,
    DentalinkPatient, SchedulingError,
};

/// Dentalink `id_estado` codes this integration writes.
pub const ESTADO_ANULADO: i64 = 1;
pub const ESTADO_NO_CONFIRMADO: i64 = 7;
pub const ESTADO_REAGENDADO: i64 = 8;

/// Default appointment length in minutes, also used for agenda queries.
pub const SLOT_MINUTES: i64 = 30;

const DEFAULT_CHAIR_ID: i64 = 1;

/// Strips the Colombia country prefix; Dentalink stores bare cell numbers.
pub fn local_cell_number(phone: &str) -> &str {
    phone.strip_prefix("57").unwrap_or(phone)
}

pub struct DentalinkClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl DentalinkClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.dentalink_base_url.clone(),
            api_token: config.dentalink_api_token.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_token.is_empty()
    }

    /// Builds the `?q=` filter path Dentalink expects: a URL-encoded JSON
    /// object, e.g. `/pacientes/?q=%7B%22celular%22%3A%22300...%22%7D`.
    fn filtered_path(endpoint: &str, filter: &Value) -> String {
        format!("{}?q={}", endpoint, urlencoding::encode(&filter.to_string()))
    }

    async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, SchedulingError>
    where
        T: DeserializeOwned,
    {
        if !self.is_configured() {
            warn!("DENTALINK_API_TOKEN not configured");
            return Err(SchedulingError::NotConfigured);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("Dentalink {} {}", method, path);

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Token {}", self.api_token))
            .header("Content-Type", "application/json");

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| SchedulingError::ExternalService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Dentalink error {}: {}", status, error_text);
            return Err(SchedulingError::ExternalService(format!(
                "{}: {}",
                status, error_text
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SchedulingError::Malformed(e.to_string()))
    }

    pub async fn list_branches(&self) -> Result<Vec<DentalinkBranch>, SchedulingError> {
        let envelope: DentalinkEnvelope<Vec<DentalinkBranch>> =
            self.request(Method::GET, "/sucursales/", None).await?;
        Ok(envelope.data)
    }

    pub async fn list_dentists(&self) -> Result<Vec<DentalinkDentist>, SchedulingError> {
        let envelope: DentalinkEnvelope<Vec<DentalinkDentist>> =
            self.request(Method::GET, "/dentistas/", None).await?;
        Ok(envelope.data)
    }

    /// Looks a patient up by cell number, first without the country prefix
    /// (how the clinic keys its records), then with the full number.
    pub async fn find_patient_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<DentalinkPatient>, SchedulingError> {
        let local = local_cell_number(phone);

        for celular in [local, phone] {
            let path = Self::filtered_path("/pacientes/", &json!({ "celular": celular }));
            let envelope: DentalinkEnvelope<Vec<DentalinkPatient>> =
                self.request(Method::GET, &path, None).await?;

            if let Some(patient) = envelope.data.into_iter().next() {
                debug!("Dentalink patient found by phone {}: ID {}", celular, patient.id);
                return Ok(Some(patient));
            }
        }

        Ok(None)
    }

    pub async fn find_patient_by_name(
        &self,
        name: &str,
    ) -> Result<Option<DentalinkPatient>, SchedulingError> {
        let path = Self::filtered_path("/pacientes/", &json!({ "nombre": name }));
        let envelope: DentalinkEnvelope<Vec<DentalinkPatient>> =
            self.request(Method::GET, &path, None).await?;

        if let Some(patient) = envelope.data.into_iter().next() {
            debug!("Dentalink patient found by name \"{}\": ID {}", name, patient.id);
            return Ok(Some(patient));
        }
        Ok(None)
    }

    /// Creates a patient record, splitting the full name into
    /// nombre/apellidos the way the Dentalink schema wants them.
    pub async fn create_patient(
        &self,
        full_name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> Result<DentalinkPatient, SchedulingError> {
        let mut parts = full_name.trim().split_whitespace();
        let nombre = parts.next().unwrap_or("Sin nombre").to_string();
        let apellidos = parts.collect::<Vec<_>>().join(" ");
        let apellidos = if apellidos.is_empty() {
            "Sin apellido".to_string()
        } else {
            apellidos
        };

        let body = json!({
            "nombre": nombre,
            "apellidos": apellidos,
            "celular": local_cell_number(phone),
            "email": email.unwrap_or(""),
        });

        debug!("Creating Dentalink patient: {} {}", nombre, apellidos);
        let envelope: DentalinkEnvelope<DentalinkPatient> =
            self.request(Method::POST, "/pacientes/", Some(body)).await?;
        Ok(envelope.data)
    }

    /// Queries one day's agenda for a branch; rows with `id_paciente == 0`
    /// are open.
    pub async fn agenda_for_day(
        &self,
        branch_id: i64,
        dentist_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<DentalinkAgendaRow>, SchedulingError> {
        let filter = json!({
            "id_sucursal": branch_id,
            "fecha": date.format("%Y-%m-%d").to_string(),
            "duracion": SLOT_MINUTES,
            "id_dentista": dentist_id,
        });

        let path = Self::filtered_path("/agendas/", &filter);
        let envelope: DentalinkEnvelope<Vec<DentalinkAgendaRow>> =
            self.request(Method::GET, &path, None).await?;
        Ok(envelope.data)
    }

    pub async fn create_cita(
        &self,
        patient_id: i64,
        dentist_id: i64,
        branch_id: i64,
        date: NaiveDate,
        time: chrono::NaiveTime,
        comment: &str,
    ) -> Result<DentalinkCita, SchedulingError> {
        let body = json!({
            "id_paciente": patient_id,
            "id_dentista": dentist_id,
            "id_sucursal": branch_id,
            "id_estado": ESTADO_NO_CONFIRMADO,
            "id_sillon": DEFAULT_CHAIR_ID,
            "fecha": date.format("%Y-%m-%d").to_string(),
            "hora_inicio": time.format("%H:%M").to_string(),
            "duracion": SLOT_MINUTES,
            "comentario": comment,
        });

        let envelope: DentalinkEnvelope<DentalinkCita> =
            self.request(Method::POST, "/citas/", Some(body)).await?;
        Ok(envelope.data)
    }

    pub async fn update_cita(
        &self,
        cita_id: i64,
        update: Value,
    ) -> Result<DentalinkCita, SchedulingError> {
        let path = format!("/citas/{}", cita_id);
        let envelope: DentalinkEnvelope<DentalinkCita> =
            self.request(Method::PUT, &path, Some(update)).await?;
        Ok(envelope.data)
    }

    pub async fn patient_citas(
        &self,
        patient_id: i64,
    ) -> Result<Vec<DentalinkCita>, SchedulingError> {
        let path = format!("/pacientes/{}/citas", patient_id);
        let envelope: DentalinkEnvelope<Vec<DentalinkCita>> =
            self.request(Method::GET, &path, None).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_prefix_is_stripped() {
        assert_eq!(local_cell_number("573001112233"), "3001112233");
        assert_eq!(local_cell_number("3001112233"), "3001112233");
    }

    #[test]
    fn filter_path_encodes_json() {
        let path =
            DentalinkClient::filtered_path("/pacientes/", &json!({ "celular": "3001112233" }));
        assert!(path.starts_with("/pacientes/?q="));
        assert!(path.contains("%22celular%22"));
    }
}
