use std::sync::Arc;

use tracing::{debug, error, info, warn};

use assistant_cell::services::responder::ResponderService;
use conversation_cell::services::store::ConversationStore;
use scheduling_cell::services::directory::ClinicDirectory;
use shared_config::AppConfig;

use crate::models::{InboundMessage, WebhookPayload};
use crate::services::outbox::BookingOutbox;
use crate::services::sender::WhatsAppSender;

pub struct MessageDispatcher {
    store: ConversationStore,
    responder: ResponderService,
    sender: WhatsAppSender,
    outbox: BookingOutbox,
}

impl MessageDispatcher {
    pub fn new(config: &AppConfig, directory: Arc<ClinicDirectory>) -> Self {
        Self {
            store: ConversationStore::new(config),
            responder: ResponderService::new(config, directory),
            sender: WhatsAppSender::new(config),
            outbox: BookingOutbox::new(config),
        }
    }

    /// Processes one delivery: every message event in arrival order, each
    /// awaited before the next. Internal failures never escape — the
    /// platform always gets its 200.
    pub async fn dispatch(&self, payload: &WebhookPayload) {
        for entry in &payload.entry {
            for change in &entry.changes {
                let messages = &change.value.messages;
                if messages.is_empty() {
                    debug!("Change without messages (field {:?})", change.field);
                    continue;
                }

                info!("{} message(s) in delivery", messages.len());
                for message in messages {
                    self.handle_message(message).await;
                }
            }
        }
    }

    async fn handle_message(&self, message: &InboundMessage) {
        let Some(body) = message.text_body() else {
            debug!("Skipping non-text message {} ({})", message.id, message.kind);
            return;
        };

        info!("Message from {}: {} chars (id {})", message.from, body.len(), message.id);

        // Redelivered events are dropped before any reply or side effect.
        if self.store.message_seen(&message.id).await {
            info!("Message {} already processed, skipping redelivery", message.id);
            return;
        }

        let reply = self
            .responder
            .generate_reply(&message.from, body, Some(&message.id))
            .await;

        // The intent is persisted before the reply leaves, so the booking
        // workflow survives a crash on the send path.
        if let Err(e) = self.outbox.enqueue(&message.from, body).await {
            error!("Failed to enqueue booking intent for {}: {}", message.from, e);
        }

        match self.sender.send_text(&message.from, &reply).await {
            Ok(receipt) => debug!("Reply delivered to {} ({:?})", message.from, receipt.message_id),
            Err(e) => warn!("Reply to {} not delivered: {}", message.from, e),
        }
    }
}
