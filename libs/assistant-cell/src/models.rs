use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use conversation_cell::models::PatientInput;
use scheduling_cell::models::ClinicLocation;

/// Base year assumed for booking dates the model emits without a year.
pub const BOOKING_BASE_YEAR: i32 = 2026;

// ==============================================================================
// CONFIGURATION ROWS
// ==============================================================================

/// The free-text system prompt, singleton row `main` in `bot_prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotPrompt {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl BotPrompt {
    pub fn empty() -> Self {
        Self {
            id: "main".to_string(),
            prompt: String::new(),
            description: Some("Prompt principal del asistente".to_string()),
            updated_at: None,
            updated_by: None,
        }
    }
}

/// One keyed row of the structured configuration bundle (`ai_config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfigEntry {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

// ==============================================================================
// CHAT COMPLETION WIRE TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

// ==============================================================================
// BOOKING INTENT
// ==============================================================================

/// Appointment fields extracted from a confirmed booking, already
/// normalized into typed values.
#[derive(Debug, Clone, Default)]
pub struct AppointmentDetails {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<ClinicLocation>,
    pub service: Option<String>,
}

impl AppointmentDetails {
    /// A booking is actionable only once both date and time are known.
    pub fn is_complete(&self) -> bool {
        self.date.is_some() && self.time.is_some()
    }
}

/// Outcome of the booking-intent extraction over one conversation.
#[derive(Debug, Clone, Default)]
pub struct BookingSignal {
    pub is_booking: bool,
    pub patient_info: Option<PatientInput>,
    pub appointment_info: Option<AppointmentDetails>,
}

impl BookingSignal {
    pub fn none() -> Self {
        Self::default()
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("OpenAI API key is not configured")]
    NotConfigured,

    #[error("OpenAI request timed out")]
    Timeout,

    #[error("OpenAI error: {0}")]
    Upstream(String),

    #[error("Empty completion from OpenAI")]
    EmptyCompletion,

    #[error("Config key already exists: {0}")]
    DuplicateKey(String),

    #[error("Config not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}
