use std::sync::Arc;

use shared_config::AppConfig;

/// Builds an `AppConfig` whose external base URLs all point at test servers.
pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub openai_base_url: String,
    pub dentalink_base_url: String,
    pub whatsapp_api_base_url: String,
    pub config_api_key: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            openai_base_url: "http://localhost:54322".to_string(),
            dentalink_base_url: "http://localhost:54323".to_string(),
            whatsapp_api_base_url: "http://localhost:54324".to_string(),
            config_api_key: None,
        }
    }
}

impl TestConfig {
    pub fn with_mock_urls(supabase: &str, openai: &str, dentalink: &str, whatsapp: &str) -> Self {
        Self {
            supabase_url: supabase.to_string(),
            openai_base_url: openai.to_string(),
            dentalink_base_url: dentalink.to_string(),
            whatsapp_api_base_url: whatsapp.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            whatsapp_verify_token: "test-verify-token".to_string(),
            whatsapp_access_token: "test-access-token".to_string(),
            whatsapp_phone_number_id: "123456789".to_string(),
            whatsapp_api_base_url: self.whatsapp_api_base_url.clone(),
            openai_api_key: "test-openai-key".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            openai_base_url: self.openai_base_url.clone(),
            dentalink_api_token: "test-dentalink-token".to_string(),
            dentalink_base_url: self.dentalink_base_url.clone(),
            dentalink_default_dentist_id: None,
            config_api_key: self.config_api_key.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}
