use std::env;
use tracing::warn;

/// WhatsApp Cloud API base; the version must match the webhook subscription.
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com/v24.0";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_DENTALINK_BASE_URL: &str = "https://api.dentalink.healthatom.com/api/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,

    pub whatsapp_verify_token: String,
    pub whatsapp_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_api_base_url: String,

    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,

    pub dentalink_api_token: String,
    pub dentalink_base_url: String,
    pub dentalink_default_dentist_id: Option<i64>,

    /// Shared secret for admin config writes. When absent the check is
    /// disabled entirely, matching the legacy deployment.
    pub config_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            }),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY").unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_KEY not set, using empty value");
                String::new()
            }),
            whatsapp_verify_token: env::var("VERIFY_TOKEN").unwrap_or_else(|_| {
                warn!("VERIFY_TOKEN not set, webhook verification will reject all requests");
                String::new()
            }),
            whatsapp_access_token: env::var("META_ACCESS_TOKEN").unwrap_or_else(|_| {
                warn!("META_ACCESS_TOKEN not set, outbound messages will fail");
                String::new()
            }),
            whatsapp_phone_number_id: env::var("PHONE_NUMBER_ID").unwrap_or_else(|_| {
                warn!("PHONE_NUMBER_ID not set, using empty value");
                String::new()
            }),
            whatsapp_api_base_url: env::var("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GRAPH_BASE_URL.to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
                warn!("OPENAI_API_KEY not set, AI replies will degrade to fallback copy");
                String::new()
            }),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            dentalink_api_token: env::var("DENTALINK_API_TOKEN").unwrap_or_else(|_| {
                warn!("DENTALINK_API_TOKEN not set, slot queries will use local fallbacks only");
                String::new()
            }),
            dentalink_base_url: env::var("DENTALINK_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_DENTALINK_BASE_URL.to_string()),
            dentalink_default_dentist_id: env::var("DENTALINK_DEFAULT_DENTISTA_ID")
                .ok()
                .and_then(|raw| raw.parse().ok()),
            config_api_key: env::var("CONFIG_API_KEY").ok().filter(|key| !key.is_empty()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if config.config_api_key.is_none() {
            warn!("CONFIG_API_KEY not set, admin config writes are unauthenticated");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.whatsapp_access_token.is_empty()
            && !self.openai_api_key.is_empty()
    }

    pub fn is_dentalink_configured(&self) -> bool {
        !self.dentalink_api_token.is_empty() && !self.dentalink_base_url.is_empty()
    }
}
