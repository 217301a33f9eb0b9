use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;
use wiremock::matchers::{method as http_method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assistant_cell::router::config_routes;
use shared_utils::test_utils::TestConfig;

async fn supabase_with_write_guard() -> MockServer {
    let server = MockServer::start().await;

    // Any write reaching the store while unauthorized is a test failure.
    Mock::given(http_method("POST"))
        .and(path("/rest/v1/ai_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn write_without_secret_is_rejected_and_does_not_mutate() {
    let supabase = supabase_with_write_guard().await;

    let config = TestConfig {
        supabase_url: supabase.uri(),
        config_api_key: Some("secreto".to_string()),
        ..TestConfig::default()
    };
    let app = config_routes(config.to_arc());

    let request = Request::builder()
        .method("PUT")
        .uri("/ai-config?key=rules")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "value": { "regla": "no inventar precios" } }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn write_with_the_secret_upserts_the_row() {
    let supabase = MockServer::start().await;

    Mock::given(http_method("POST"))
        .and(path("/rest/v1/ai_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "key": "rules",
            "value": { "regla": "no inventar precios" },
            "description": null,
            "updated_by": "api",
        }])))
        .expect(1)
        .mount(&supabase)
        .await;

    let config = TestConfig {
        supabase_url: supabase.uri(),
        config_api_key: Some("secreto".to_string()),
        ..TestConfig::default()
    };
    let app = config_routes(config.to_arc());

    let request = Request::builder()
        .method("PUT")
        .uri("/ai-config?key=rules")
        .header("content-type", "application/json")
        .header("x-api-key", "secreto")
        .body(Body::from(
            json!({ "value": { "regla": "no inventar precios" } }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_bot_prompt_row_returns_the_empty_shape() {
    let supabase = MockServer::start().await;

    Mock::given(http_method("GET"))
        .and(path("/rest/v1/bot_prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&supabase)
        .await;

    let config = TestConfig {
        supabase_url: supabase.uri(),
        ..TestConfig::default()
    };
    let app = config_routes(config.to_arc());

    let request = Request::builder()
        .method("GET")
        .uri("/bot-prompt")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["id"], "main");
    assert_eq!(body["prompt"], "");
}
