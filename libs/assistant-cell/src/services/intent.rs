use std::sync::OnceLock;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use conversation_cell::models::{ChatTurn, PatientInput};
use scheduling_cell::models::ClinicLocation;
use shared_config::AppConfig;

use crate::models::{AppointmentDetails, AssistantError, BookingSignal, ChatMessage, BOOKING_BASE_YEAR};
use crate::services::openai::OpenAiClient;

const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(5);
const EXTRACTION_MAX_TOKENS: u32 = 150;
const EXTRACTION_TEMPERATURE: f32 = 0.2;

const NAME_TIMEOUT: Duration = Duration::from_secs(5);
const NAME_MAX_TOKENS: u32 = 50;
const NAME_TEMPERATURE: f32 = 0.1;

/// Phrases that suggest the user is introducing themselves.
const NAME_KEYWORDS: [&str; 4] = ["me llamo", "mi nombre es", "soy", "nombre completo"];

// ==============================================================================
// DATE / TIME NORMALIZATION
// ==============================================================================

fn full_date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn month_day_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}$").unwrap())
}

fn day_month_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})[/-](\d{1,2})").unwrap())
}

/// Normalizes a model-emitted date into a real date.
///
/// `YYYY-MM-DD` passes through; `MM-DD` gets the base year prepended;
/// `D/M` or `D-M` (day first) is recovered as a last resort. Anything else
/// is dropped — a malformed date degrades to "no appointment created".
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if full_date_pattern().is_match(raw) {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok();
    }

    if month_day_pattern().is_match(raw) {
        let candidate = format!("{}-{}", BOOKING_BASE_YEAR, raw);
        debug!("Date without year, assuming {}: {} -> {}", BOOKING_BASE_YEAR, raw, candidate);
        return NaiveDate::parse_from_str(&candidate, "%Y-%m-%d").ok();
    }

    if let Some(captures) = day_month_pattern().captures(raw) {
        let day: u32 = captures[1].parse().ok()?;
        let month: u32 = captures[2].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(BOOKING_BASE_YEAR, month, day);
        if let Some(date) = date {
            debug!("Date recovered with base year: {} -> {}", raw, date);
        }
        return date;
    }

    None
}

pub fn normalize_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Model output may arrive wrapped in markdown code fences.
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// The model sometimes emits the string "null" instead of a JSON null.
fn clean(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty() && text != "null")
}

// ==============================================================================
// RAW WIRE SHAPE
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignal {
    #[serde(default)]
    is_booking: bool,
    #[serde(default)]
    patient_info: Option<RawPatientInfo>,
    #[serde(default)]
    appointment_info: Option<RawAppointmentInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPatientInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAppointmentInfo {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    service: Option<String>,
}

fn parse_signal(raw_text: &str) -> Option<BookingSignal> {
    let cleaned = strip_code_fences(raw_text);
    let raw: RawSignal = serde_json::from_str(&cleaned).ok()?;

    if !raw.is_booking {
        return Some(BookingSignal::none());
    }

    let patient_info = raw.patient_info.and_then(|info| {
        let input = PatientInput {
            name: clean(info.name),
            document: clean(info.document),
            email: clean(info.email),
        };
        (!input.is_empty()).then_some(input)
    });

    let appointment_info = raw.appointment_info.map(|info| AppointmentDetails {
        date: clean(info.date).as_deref().and_then(normalize_date),
        time: clean(info.time).as_deref().and_then(normalize_time),
        location: clean(info.location).and_then(|raw| raw.parse::<ClinicLocation>().ok()),
        service: clean(info.service),
    });

    Some(BookingSignal {
        is_booking: true,
        patient_info,
        appointment_info,
    })
}

// ==============================================================================
// EXTRACTOR
// ==============================================================================

pub struct IntentExtractor {
    openai: OpenAiClient,
}

impl IntentExtractor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            openai: OpenAiClient::new(config),
        }
    }

    /// Classifies whether the conversation just reached an explicit booking
    /// confirmation and, if so, extracts patient and appointment fields.
    /// Every failure mode — timeout, upstream error, unparsable output —
    /// answers "no booking": extraction must never break the reply flow.
    pub async fn detect_booking(
        &self,
        history: &[ChatTurn],
        current_message: &str,
    ) -> BookingSignal {
        let instruction = Self::extraction_prompt(history, current_message);
        let messages = [
            ChatMessage::system(instruction),
            ChatMessage::user("Analiza la conversación y responde con el JSON."),
        ];

        let completion = self
            .openai
            .chat_completion(
                &messages,
                EXTRACTION_MAX_TOKENS,
                EXTRACTION_TEMPERATURE,
                EXTRACTION_TIMEOUT,
            )
            .await;

        match completion {
            Ok(raw) => parse_signal(&raw).unwrap_or_else(|| {
                warn!("Unparsable extraction output, assuming no booking");
                BookingSignal::none()
            }),
            Err(AssistantError::Timeout) => {
                warn!("Booking extraction timed out");
                BookingSignal::none()
            }
            Err(e) => {
                warn!("Booking extraction failed: {}", e);
                BookingSignal::none()
            }
        }
    }

    /// Heuristic gate for the registration flow: does the message look like
    /// the user is telling us their name?
    pub fn might_be_providing_name(message: &str) -> bool {
        let lowered = message.to_lowercase();
        NAME_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
            || (message.split_whitespace().count() <= 4
                && !message.contains('?')
                && !message.contains('¿'))
    }

    /// One focused call that answers with the bare full name, or nothing.
    pub async fn extract_name(&self, message: &str) -> Option<String> {
        let instruction = format!(
            "Extrae el nombre completo de la siguiente frase. Responde SOLO con el nombre \
             completo o \"null\" si no hay nombre claro.\n\nFrase: \"{}\"\n\nResponde solo con \
             el nombre o \"null\":",
            message
        );
        let messages = [
            ChatMessage::system(instruction),
            ChatMessage::user("Extrae el nombre."),
        ];

        let completion = self
            .openai
            .chat_completion(&messages, NAME_MAX_TOKENS, NAME_TEMPERATURE, NAME_TIMEOUT)
            .await
            .ok()?;

        let name = completion.trim().trim_matches('"').to_string();
        (name.to_lowercase() != "null" && name.len() > 2).then_some(name)
    }

    fn extraction_prompt(history: &[ChatTurn], current_message: &str) -> String {
        let transcript = history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Analiza la siguiente conversación y:
1. Determina si el usuario está CONFIRMANDO EXPLÍCITAMENTE una cita médica (NO solo expresando intención)
2. Si es confirmación, extrae la información del paciente Y de la cita

IMPORTANTE: Solo marca "isBooking": true si el usuario CONFIRMA EXPLÍCITAMENTE (dice "sí", "confirmo", "acepto", "correcto", "está bien", "de acuerdo", etc.)
NO marques true si solo está preguntando, consultando o expresando intención sin confirmar.

Responde SOLO con un JSON válido en este formato exacto:
{{
  "isBooking": true o false,
  "patientInfo": {{
    "name": "nombre completo o null",
    "document": "documento o null",
    "email": "correo o null"
  }},
  "appointmentInfo": {{
    "date": "YYYY-MM-DD o null (SIEMPRE con año completo, si no tiene año asume {year})",
    "time": "HH:MM o null",
    "location": "rodadero o manzanares o null",
    "service": "servicio solicitado o null"
  }}
}}

Indicadores de CONFIRMACIÓN (isBooking: true):
- El usuario dice "sí", "confirmo", "acepto", "correcto", "está bien", "de acuerdo", "perfecto"
- El usuario confirma explícitamente después de ver un resumen de cita
- El usuario dice "agenda" o "reserva" después de proporcionar todos los datos

NO es confirmación (isBooking: false):
- El usuario solo pregunta por disponibilidad
- El usuario proporciona datos pero no confirma
- El usuario dice "quiero agendar" sin confirmar explícitamente
- El bot muestra un resumen pero el usuario no ha confirmado aún

Conversación:
{transcript}
Usuario actual: {current}"#,
            year = BOOKING_BASE_YEAR,
            transcript = transcript,
            current = current_message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_dates_pass_through_unchanged() {
        assert_eq!(
            normalize_date("2026-01-23"),
            NaiveDate::from_ymd_opt(2026, 1, 23)
        );
    }

    #[test]
    fn month_day_gets_the_base_year() {
        assert_eq!(
            normalize_date("01-23"),
            NaiveDate::from_ymd_opt(2026, 1, 23)
        );
    }

    #[test]
    fn day_month_forms_are_recovered() {
        assert_eq!(
            normalize_date("23/01"),
            NaiveDate::from_ymd_opt(2026, 1, 23)
        );
        assert_eq!(normalize_date("5/3"), NaiveDate::from_ymd_opt(2026, 3, 5));
    }

    #[test]
    fn garbage_dates_are_dropped() {
        assert_eq!(normalize_date("mañana"), None);
        assert_eq!(normalize_date("2026-13-40"), None);
        assert_eq!(normalize_date("99/99"), None);
    }

    #[test]
    fn fenced_json_is_parsed() {
        let raw = "```json\n{\"isBooking\": true, \"appointmentInfo\": {\"date\": \"2026-02-10\", \"time\": \"10:00\", \"location\": \"rodadero\", \"service\": null}}\n```";
        let signal = parse_signal(raw).unwrap();
        assert!(signal.is_booking);
        let info = signal.appointment_info.unwrap();
        assert_eq!(info.date, NaiveDate::from_ymd_opt(2026, 2, 10));
        assert_eq!(info.time, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(info.location, Some(ClinicLocation::Rodadero));
        assert_eq!(info.service, None);
    }

    #[test]
    fn null_strings_are_treated_as_absent() {
        let raw = r#"{"isBooking": true, "patientInfo": {"name": "null", "document": "null", "email": "null"}}"#;
        let signal = parse_signal(raw).unwrap();
        assert!(signal.is_booking);
        assert!(signal.patient_info.is_none());
    }

    #[test]
    fn non_booking_output_keeps_fields_empty() {
        let raw = r#"{"isBooking": false, "patientInfo": {"name": "Ana"}}"#;
        let signal = parse_signal(raw).unwrap();
        assert!(!signal.is_booking);
        assert!(signal.patient_info.is_none());
        assert!(signal.appointment_info.is_none());
    }

    #[test]
    fn unparsable_output_is_none() {
        assert!(parse_signal("no soy json").is_none());
    }

    #[test]
    fn name_heuristic_matches_introductions() {
        assert!(IntentExtractor::might_be_providing_name("Me llamo Ana Pérez"));
        assert!(IntentExtractor::might_be_providing_name("Ana Pérez Gómez"));
        assert!(!IntentExtractor::might_be_providing_name(
            "¿Cuánto cuesta una limpieza dental en la sede del Rodadero?"
        ));
    }
}
