use anyhow::Result;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{ChatRole, ChatTurn, ConversationSummary, Message};

pub struct ConversationStore {
    supabase: SupabaseClient,
}

impl ConversationStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Appends one turn to the message log. Storage failures are logged and
    /// swallowed: losing a log row must never break the reply flow.
    pub async fn save_message(
        &self,
        phone_number: &str,
        role: ChatRole,
        content: &str,
        message_id: Option<&str>,
    ) {
        let body = json!({
            "phone_number": phone_number,
            "role": role.to_string(),
            "content": content,
            "message_id": message_id,
        });

        // Without the Prefer header PostgREST answers 201 with an empty body.
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Result<Vec<Value>> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/messages", Some(body), Some(headers))
            .await;

        match result {
            Ok(_) => debug!("Message saved: {} from {}", role, phone_number),
            Err(e) => error!("Failed to save {} message for {}: {}", role, phone_number, e),
        }
    }

    /// Returns up to `limit` most-recent turns for a phone number, oldest
    /// first. An unavailable store yields an empty history; callers treat
    /// that as a new conversation, not an error.
    pub async fn get_history(&self, phone_number: &str, limit: usize) -> Vec<ChatTurn> {
        let path = format!(
            "/rest/v1/messages?phone_number=eq.{}&select=role,content&order=created_at.desc&limit={}",
            phone_number, limit
        );

        let result: Result<Vec<ChatTurn>> = self.supabase.request(Method::GET, &path, None).await;

        match result {
            Ok(mut turns) => {
                turns.reverse();
                turns
            }
            Err(e) => {
                warn!("Failed to fetch history for {}: {}", phone_number, e);
                Vec::new()
            }
        }
    }

    /// Idempotency probe: has this platform message id already been stored?
    /// A store failure answers `false` so delivery degrades to reprocessing
    /// rather than dropping the message.
    pub async fn message_seen(&self, message_id: &str) -> bool {
        let path = format!(
            "/rest/v1/messages?message_id=eq.{}&select=message_id&limit=1",
            message_id
        );

        let result: Result<Vec<Value>> = self.supabase.request(Method::GET, &path, None).await;

        match result {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                warn!("Idempotency check failed for {}: {}", message_id, e);
                false
            }
        }
    }

    /// Newest-first page of full message rows for one conversation.
    pub async fn page_messages(
        &self,
        phone_number: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let path = format!(
            "/rest/v1/messages?phone_number=eq.{}&order=created_at.desc&limit={}&offset={}",
            phone_number, limit, offset
        );

        self.supabase.request(Method::GET, &path, None).await
    }

    /// Groups the message log into per-phone conversation summaries ordered
    /// by most recent activity.
    pub async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(usize, Vec<ConversationSummary>)> {
        #[derive(serde::Deserialize)]
        struct LogRow {
            phone_number: String,
            #[serde(default)]
            created_at: Option<chrono::DateTime<chrono::Utc>>,
        }

        let path = "/rest/v1/messages?select=phone_number,created_at&order=created_at.desc";
        let rows: Vec<LogRow> = self.supabase.request(Method::GET, path, None).await?;

        let mut summaries: Vec<ConversationSummary> = Vec::new();
        for row in rows {
            match summaries
                .iter()
                .position(|summary| summary.phone_number == row.phone_number)
            {
                Some(index) => summaries[index].message_count += 1,
                None => summaries.push(ConversationSummary {
                    phone_number: row.phone_number,
                    message_count: 1,
                    // Rows arrive newest-first, so the first one wins.
                    last_message_at: row.created_at,
                }),
            }
        }

        let total = summaries.len();
        let page = summaries.into_iter().skip(offset).take(limit).collect();
        Ok((total, page))
    }
}
