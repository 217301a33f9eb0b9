use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{SendReceipt, WebhookError};

const SEND_TIMEOUT: Duration = Duration::from_secs(8);

pub struct WhatsAppSender {
    client: Client,
    base_url: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsAppSender {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.whatsapp_api_base_url.clone(),
            access_token: config.whatsapp_access_token.clone(),
            phone_number_id: config.whatsapp_phone_number_id.clone(),
        }
    }

    /// Posts one text message. A single bounded attempt: non-2xx and network
    /// failures surface as structured errors the caller logs and drops — the
    /// platform owns delivery retries.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, WebhookError> {
        if self.access_token.is_empty() {
            return Err(WebhookError::SendFailed(
                "META_ACCESS_TOKEN no configurado".to_string(),
            ));
        }
        if self.phone_number_id.is_empty() {
            return Err(WebhookError::SendFailed(
                "PHONE_NUMBER_ID no configurado".to_string(),
            ));
        }

        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": body,
            },
        });

        debug!("Sending WhatsApp message to {}", to);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("WhatsApp send to {} timed out after 8s", to);
                    WebhookError::SendTimeout
                } else {
                    WebhookError::SendFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            match data["error"]["code"].as_i64() {
                Some(190) => error!("WhatsApp token expired or invalid; update META_ACCESS_TOKEN"),
                Some(100) => error!("PHONE_NUMBER_ID wrong or lacking permissions"),
                _ => {}
            }
            error!("WhatsApp send to {} failed ({}): {}", to, status, data);
            return Err(WebhookError::SendFailed(format!("{}: {}", status, data)));
        }

        let message_id = data["messages"][0]["id"].as_str().map(String::from);
        info!("Message sent to {} (id {:?})", to, message_id);

        Ok(SendReceipt { message_id })
    }
}
