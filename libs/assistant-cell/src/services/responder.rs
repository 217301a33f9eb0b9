use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use conversation_cell::models::ChatRole;
use conversation_cell::services::patient::PatientDirectory;
use conversation_cell::services::store::ConversationStore;
use scheduling_cell::services::availability::AvailabilityService;
use scheduling_cell::services::directory::ClinicDirectory;
use scheduling_cell::time::colombia_today;
use shared_config::AppConfig;

use crate::models::{AssistantError, ChatMessage};
use crate::services::config::BotConfigService;
use crate::services::openai::OpenAiClient;
use crate::services::prompt::{build_system_prompt, format_availability, PromptContext};

const HISTORY_WINDOW: usize = 20;
const AVAILABILITY_DAYS_AHEAD: u32 = 7;
const REPLY_TIMEOUT: Duration = Duration::from_secs(15);
const REPLY_MAX_TOKENS: u32 = 400;
const REPLY_TEMPERATURE: f32 = 0.8;

/// Terms that make the responder inject live slot availability into the
/// system prompt before calling the model.
const APPOINTMENT_KEYWORDS: [&str; 9] = [
    "disponibilidad",
    "disponible",
    "cita",
    "agendar",
    "horario",
    "fecha",
    "cuando puedo",
    "cuando hay",
    "agenda",
];

const APOLOGY_NOT_CONFIGURED: &str =
    "Lo siento, no puedo responder ahora mismo. La configuración de IA no está disponible.";
const APOLOGY_UPSTREAM: &str = "Lo siento, hubo un error al contactar a la IA.";
const APOLOGY_TIMEOUT: &str =
    "Lo siento, tardé demasiado en responder. Por favor intenta de nuevo.";
const APOLOGY_GENERIC: &str = "Lo siento, no puedo responder ahora mismo.";

pub struct ResponderService {
    store: ConversationStore,
    patients: PatientDirectory,
    bot_config: BotConfigService,
    openai: OpenAiClient,
    availability: AvailabilityService,
}

impl ResponderService {
    pub fn new(config: &AppConfig, directory: Arc<ClinicDirectory>) -> Self {
        Self {
            store: ConversationStore::new(config),
            patients: PatientDirectory::new(config),
            bot_config: BotConfigService::new(config),
            openai: OpenAiClient::new(config),
            availability: AvailabilityService::new(config, directory),
        }
    }

    /// Produces the assistant's reply to one inbound message and persists
    /// both sides of the turn. Never fails: every degradation path answers
    /// with a generic Spanish apology line instead.
    pub async fn generate_reply(
        &self,
        phone_number: &str,
        user_message: &str,
        user_message_id: Option<&str>,
    ) -> String {
        debug!("Generating reply for {}", phone_number);

        if !self.openai.is_configured() {
            warn!("OPENAI_API_KEY missing, returning fallback copy");
            return APOLOGY_NOT_CONFIGURED.to_string();
        }

        let history = self.store.get_history(phone_number, HISTORY_WINDOW).await;
        let is_new_conversation = history.is_empty();
        debug!(
            "History for {}: {} messages ({})",
            phone_number,
            history.len(),
            if is_new_conversation { "new conversation" } else { "existing conversation" }
        );

        let patient = self.patients.get_by_phone(phone_number).await;
        let bot_prompt = self.bot_config.get_bot_prompt().await;
        let ai_config = self.bot_config.get_ai_config().await;

        let mut system_prompt = build_system_prompt(&PromptContext {
            bot_prompt: &bot_prompt,
            config: &ai_config,
            phone_number,
            patient: patient.as_ref(),
            has_history: !is_new_conversation,
            today: colombia_today(),
        });

        if Self::asks_for_availability(user_message) {
            debug!("Availability keywords detected, querying slots");
            let slots = self
                .availability
                .get_available_slots(colombia_today(), None, AVAILABILITY_DAYS_AHEAD)
                .await;
            info!("Availability injected into prompt: {} slots", slots.len());
            system_prompt.push_str(&format_availability(&slots));
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        for turn in &history {
            let content = turn.content.trim();
            if content.is_empty() {
                continue;
            }
            messages.push(match turn.role {
                ChatRole::User => ChatMessage::user(content),
                ChatRole::Assistant => ChatMessage::assistant(content),
            });
        }
        messages.push(ChatMessage::user(user_message));

        let reply = match self
            .openai
            .chat_completion(&messages, REPLY_MAX_TOKENS, REPLY_TEMPERATURE, REPLY_TIMEOUT)
            .await
        {
            Ok(reply) => reply,
            Err(AssistantError::Timeout) => {
                warn!("Reply generation timed out for {}", phone_number);
                return APOLOGY_TIMEOUT.to_string();
            }
            Err(AssistantError::EmptyCompletion) => {
                warn!("Empty completion for {}", phone_number);
                return APOLOGY_GENERIC.to_string();
            }
            Err(e) => {
                warn!("Reply generation failed for {}: {}", phone_number, e);
                return APOLOGY_UPSTREAM.to_string();
            }
        };

        // User turn first so history reads in order.
        self.store
            .save_message(phone_number, ChatRole::User, user_message, user_message_id)
            .await;
        self.store
            .save_message(phone_number, ChatRole::Assistant, &reply, None)
            .await;

        reply
    }

    fn asks_for_availability(message: &str) -> bool {
        let lowered = message.to_lowercase();
        APPOINTMENT_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
    }
}
