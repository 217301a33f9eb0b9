use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{error, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AiConfigEntry, AssistantError, BotPrompt};

/// Generic prompt used whenever the configured one cannot be loaded.
pub const FALLBACK_PROMPT: &str =
    "Eres un asistente virtual amable y profesional. Responde de manera breve y útil.";

pub struct BotConfigService {
    supabase: SupabaseClient,
}

impl BotConfigService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// The free-text system prompt. Unreachable store or missing row
    /// degrade to a hard-coded generic prompt, never to an error.
    pub async fn get_bot_prompt(&self) -> String {
        let path = "/rest/v1/bot_prompt?id=eq.main&select=prompt&limit=1";
        let result: Result<Vec<Value>> = self.supabase.request(Method::GET, path, None).await;

        match result {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.get("prompt"))
                .and_then(Value::as_str)
                .filter(|prompt| !prompt.is_empty())
                .map(String::from)
                .unwrap_or_else(|| {
                    warn!("Bot prompt row missing, using fallback");
                    FALLBACK_PROMPT.to_string()
                }),
            Err(e) => {
                error!("Failed to fetch bot prompt: {}", e);
                FALLBACK_PROMPT.to_string()
            }
        }
    }

    pub async fn get_bot_prompt_row(&self) -> Result<BotPrompt, AssistantError> {
        let path = "/rest/v1/bot_prompt?id=eq.main&limit=1";
        let rows: Vec<BotPrompt> = self
            .supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| AssistantError::Database(e.to_string()))?;

        Ok(rows.into_iter().next().unwrap_or_else(BotPrompt::empty))
    }

    pub async fn update_bot_prompt(
        &self,
        prompt: &str,
        description: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<BotPrompt, AssistantError> {
        let body = json!({
            "id": "main",
            "prompt": prompt,
            "description": description.unwrap_or("Prompt principal del asistente"),
            "updated_at": Utc::now().to_rfc3339(),
            "updated_by": updated_by.unwrap_or("admin_ui"),
        });

        let rows: Vec<BotPrompt> = self
            .upsert("/rest/v1/bot_prompt?on_conflict=id", body)
            .await
            .map_err(|e| AssistantError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AssistantError::Database("Upsert returned no row".to_string()))
    }

    /// The structured configuration bundle as key → row. Failures yield an
    /// empty bundle; the prompt builder simply skips absent sections.
    pub async fn get_ai_config(&self) -> BTreeMap<String, AiConfigEntry> {
        let path = "/rest/v1/ai_config?order=key";
        let result: Result<Vec<AiConfigEntry>> =
            self.supabase.request(Method::GET, path, None).await;

        match result {
            Ok(rows) => rows.into_iter().map(|row| (row.key.clone(), row)).collect(),
            Err(e) => {
                error!("Failed to fetch ai_config: {}", e);
                BTreeMap::new()
            }
        }
    }

    pub async fn get_config_entry(&self, key: &str) -> Result<AiConfigEntry, AssistantError> {
        let path = format!("/rest/v1/ai_config?key=eq.{}&limit=1", key);
        let rows: Vec<AiConfigEntry> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AssistantError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AssistantError::NotFound(key.to_string()))
    }

    pub async fn upsert_config_entry(
        &self,
        key: &str,
        value: Value,
        description: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<AiConfigEntry, AssistantError> {
        let body = json!({
            "key": key,
            "value": value,
            "description": description,
            "updated_at": Utc::now().to_rfc3339(),
            "updated_by": updated_by.unwrap_or("api"),
        });

        let rows: Vec<AiConfigEntry> = self
            .upsert("/rest/v1/ai_config?on_conflict=key", body)
            .await
            .map_err(|e| AssistantError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AssistantError::Database("Upsert returned no row".to_string()))
    }

    pub async fn create_config_entry(
        &self,
        key: &str,
        value: Value,
        description: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<AiConfigEntry, AssistantError> {
        if self.get_config_entry(key).await.is_ok() {
            return Err(AssistantError::DuplicateKey(key.to_string()));
        }

        self.upsert_config_entry(key, value, description, updated_by)
            .await
    }

    async fn upsert<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=merge-duplicates,return=representation",
            ),
        );

        self.supabase
            .request_with_headers(Method::POST, path, Some(body), Some(headers))
            .await
    }
}
