use axum::http::HeaderMap;

use shared_config::AppConfig;
use shared_models::error::AppError;

/// Guards admin configuration writes with a shared secret.
///
/// The secret is read from `x-api-key` or an `Authorization: Bearer` header.
/// When no `CONFIG_API_KEY` is configured the check is disabled and every
/// request passes, mirroring the legacy deployment.
pub fn verify_api_key(config: &AppConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = config.config_api_key.as_deref() else {
        return Ok(());
    };

    let provided = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        });

    match provided {
        Some(key) if key == expected => Ok(()),
        _ => Err(AppError::Auth("API key inválida o faltante".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestConfig;
    use axum::http::HeaderValue;

    #[test]
    fn passes_when_no_secret_is_configured() {
        let config = TestConfig::default().to_app_config();
        assert!(verify_api_key(&config, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn rejects_missing_or_wrong_key() {
        let config = TestConfig {
            config_api_key: Some("secreto".to_string()),
            ..TestConfig::default()
        }
        .to_app_config();

        assert!(verify_api_key(&config, &HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("otro"));
        assert!(verify_api_key(&config, &headers).is_err());
    }

    #[test]
    fn accepts_key_from_either_header() {
        let config = TestConfig {
            config_api_key: Some("secreto".to_string()),
            ..TestConfig::default()
        }
        .to_app_config();

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secreto"));
        assert!(verify_api_key(&config, &headers).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer secreto"));
        assert!(verify_api_key(&config, &headers).is_ok());
    }
}
