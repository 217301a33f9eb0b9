use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// WEBHOOK ENVELOPE
// ==============================================================================

/// Subscription-verification query: `GET /webhook?hub.mode=…`.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// Top-level delivery envelope posted by the messaging platform.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookPayload {
    pub fn is_whatsapp(&self) -> bool {
        matches!(self.object.as_deref(), Some("whatsapp_business_account"))
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<ChangeMetadata>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default)]
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
}

impl InboundMessage {
    pub fn text_body(&self) -> Option<&str> {
        if self.kind != "text" {
            return None;
        }
        self.text
            .as_ref()
            .map(|text| text.body.as_str())
            .filter(|body| !body.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: String,
}

// ==============================================================================
// OUTBOUND SEND
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub message_id: Option<String>,
}

// ==============================================================================
// BOOKING INTENT OUTBOX
// ==============================================================================

/// Lifecycle of a persisted booking intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentStatus::Pending => write!(f, "pending"),
            IntentStatus::Processing => write!(f, "processing"),
            IntentStatus::Completed => write!(f, "completed"),
            IntentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One row of the `booking_intents` outbox. The intent is persisted before
/// the reply goes out, so a crashed or slow extraction can be retried
/// instead of silently losing a confirmed booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingIntent {
    pub id: Uuid,
    pub phone_number: String,
    pub user_message: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Messaging platform error: {0}")]
    SendFailed(String),

    #[error("Send request timed out")]
    SendTimeout,

    #[error("Outbox error: {0}")]
    Outbox(String),
}
