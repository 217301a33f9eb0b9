use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{AssistantError, ChatCompletionResponse, ChatMessage};

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// One chat completion round-trip. The timeout is per call site: the
    /// user-facing reply gets more room than the background extraction.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, AssistantError> {
        if !self.is_configured() {
            return Err(AssistantError::NotConfigured);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        debug!("OpenAI request: {} messages, model {}", messages.len(), self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout
                } else {
                    AssistantError::Upstream(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI error {}: {}", status, error_text);
            return Err(AssistantError::Upstream(format!("{}: {}", status, error_text)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Upstream(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(AssistantError::EmptyCompletion)
    }
}
