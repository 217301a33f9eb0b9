use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One side of a stored conversation turn, as fed back into the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Full message row as stored in the `messages` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub phone_number: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Patient record keyed by phone number. Fields are filled in as the
/// conversation reveals them and never overwritten once populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub dentalink_patient_id: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn is_registered(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.is_empty())
    }

    pub fn has_complete_identity(&self) -> bool {
        self.name.is_some() && self.document.is_some() && self.email.is_some()
    }
}

/// Identity fields extracted from conversation text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInput {
    pub name: Option<String>,
    pub document: Option<String>,
    pub email: Option<String>,
}

impl PatientInput {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.document.is_none() && self.email.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub phone_number: String,
    pub message_count: usize,
    pub last_message_at: Option<DateTime<Utc>>,
}
