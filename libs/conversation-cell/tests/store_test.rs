use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conversation_cell::models::{ChatRole, PatientInput};
use conversation_cell::services::patient::PatientDirectory;
use conversation_cell::services::store::ConversationStore;
use shared_utils::test_utils::TestConfig;

fn config_for(server: &MockServer) -> shared_config::AppConfig {
    TestConfig {
        supabase_url: server.uri(),
        ..TestConfig::default()
    }
    .to_app_config()
}

#[tokio::test]
async fn history_is_returned_oldest_first() {
    let server = MockServer::start().await;

    // Supabase answers newest-first; the store reverses for prompt order.
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("phone_number", "eq.573001112233"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "role": "assistant", "content": "¿Te confirmo la cita?" },
            { "role": "user", "content": "Hola, quiero una cita" },
        ])))
        .mount(&server)
        .await;

    let store = ConversationStore::new(&config_for(&server));
    let history = store.get_history("573001112233", 20).await;

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[1].role, ChatRole::Assistant);
}

#[tokio::test]
async fn unavailable_store_yields_empty_history() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = ConversationStore::new(&config_for(&server));
    let history = store.get_history("573001112233", 20).await;

    assert!(history.is_empty());
}

#[tokio::test]
async fn message_seen_detects_stored_platform_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("message_id", "eq.wamid.abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "message_id": "wamid.abc" }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("message_id", "eq.wamid.new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = ConversationStore::new(&config_for(&server));

    assert!(store.message_seen("wamid.abc").await);
    assert!(!store.message_seen("wamid.new").await);
}

#[tokio::test]
async fn upsert_patches_only_missing_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone_number", "eq.573001112233"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "phone_number": "573001112233",
            "name": "Ana Pérez",
            "document": null,
            "email": null,
        }])))
        .mount(&server)
        .await;

    // The patch must carry the missing document but not touch the name.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({ "document": "12345678" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "phone_number": "573001112233",
            "name": "Ana Pérez",
            "document": "12345678",
            "email": null,
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let directory = PatientDirectory::new(&config_for(&server));
    let input = PatientInput {
        name: Some("Otro Nombre".to_string()),
        document: Some("12345678".to_string()),
        email: None,
    };

    let patient = directory.upsert("573001112233", &input).await.unwrap();
    assert_eq!(patient.name.as_deref(), Some("Ana Pérez"));
    assert_eq!(patient.document.as_deref(), Some("12345678"));
}
