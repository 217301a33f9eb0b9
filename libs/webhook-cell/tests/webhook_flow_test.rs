use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::services::directory::ClinicDirectory;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;
use webhook_cell::models::{BookingIntent, IntentStatus};
use webhook_cell::services::outbox::OutboxWorker;
use webhook_cell::{webhook_routes, WebhookState};

const PHONE: &str = "573001112233";
const MESSAGE_ID: &str = "wamid.HBgLNTczMDAxMTEyMjMz";
const CONFIRMATION: &str = "Sí, confirmo la cita del 2026-02-10 a las 10:00 en Rodadero";

struct TestHarness {
    supabase: MockServer,
    openai: MockServer,
    dentalink: MockServer,
    whatsapp: MockServer,
    config: AppConfig,
}

impl TestHarness {
    async fn start() -> Self {
        let supabase = MockServer::start().await;
        let openai = MockServer::start().await;
        let dentalink = MockServer::start().await;
        let whatsapp = MockServer::start().await;

        let config = TestConfig::with_mock_urls(
            &supabase.uri(),
            &openai.uri(),
            &dentalink.uri(),
            &whatsapp.uri(),
        )
        .to_app_config();

        Self {
            supabase,
            openai,
            dentalink,
            whatsapp,
            config,
        }
    }

    fn state(&self) -> WebhookState {
        WebhookState {
            config: Arc::new(self.config.clone()),
            directory: Arc::new(ClinicDirectory::new(&self.config)),
        }
    }
}

fn delivery_payload() -> serde_json::Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "entry-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "metadata": { "phone_number_id": "123456789" },
                    "messages": [{
                        "from": PHONE,
                        "id": MESSAGE_ID,
                        "timestamp": "1770000000",
                        "type": "text",
                        "text": { "body": CONFIRMATION },
                    }],
                },
            }],
        }],
    })
}

fn webhook_request(payload: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn mount_supabase(harness: &TestHarness) {
    // First idempotency probe: unseen. Every later probe: already stored.
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("message_id", format!("eq.{}", MESSAGE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&harness.supabase)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("message_id", format!("eq.{}", MESSAGE_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "message_id": MESSAGE_ID }])),
        )
        .mount(&harness.supabase)
        .await;

    // Conversation history: the bot proposed the exact slot one turn ago.
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("phone_number", format!("eq.{}", PHONE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "role": "assistant",
                "content": "Tengo disponible el 2026-02-10 a las 10:00 en Rodadero. ¿Confirmas?",
            },
            { "role": "user", "content": "Quiero una cita para una limpieza" },
        ])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "phone_number": PHONE,
            "name": "Ana Pérez",
            "document": "12345678",
            "email": "ana@example.com",
            "dentalink_patient_id": 42,
        }])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bot_prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "prompt": "Eres el asistente de la Clínica Dr. Albeiro García." }
        ])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/ai_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.supabase)
        .await;

    // Exactly one pending intent may be persisted across both deliveries.
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_intents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&harness.supabase)
        .await;
}

async fn mount_dentalink(harness: &TestHarness) {
    Mock::given(method("GET"))
        .and(path("/sucursales/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
            { "id": 10, "nombre": "Clínica El Rodadero" },
            { "id": 11, "nombre": "Sede Manzanares" },
        ]})))
        .mount(&harness.dentalink)
        .await;
    Mock::given(method("GET"))
        .and(path("/dentistas/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
            { "id": 7, "nombre": "Dr. Albeiro García", "email": "dr@example.com" },
        ]})))
        .mount(&harness.dentalink)
        .await;
    Mock::given(method("GET"))
        .and(path("/agendas/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
            { "id_paciente": 0, "hora_inicio": "10:00:00" },
        ]})))
        .mount(&harness.dentalink)
        .await;
}

async fn mount_openai(harness: &TestHarness) {
    // The user-facing reply (max_tokens 400).
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "max_tokens": 400 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": "¡Listo Ana! Tu cita quedó confirmada para el 2026-02-10 a las 10:00 en Rodadero.",
            }}],
        })))
        .mount(&harness.openai)
        .await;

    // The booking extraction (max_tokens 150).
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "max_tokens": 150 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": "{\"isBooking\": true, \"patientInfo\": {\"name\": \"Ana Pérez\", \"document\": null, \"email\": null}, \"appointmentInfo\": {\"date\": \"2026-02-10\", \"time\": \"10:00\", \"location\": \"rodadero\", \"service\": \"Limpieza\"}}",
            }}],
        })))
        .mount(&harness.openai)
        .await;
}

#[tokio::test]
async fn confirmation_books_once_and_redelivery_is_ignored() {
    let harness = TestHarness::start().await;
    mount_supabase(&harness).await;
    mount_dentalink(&harness).await;
    mount_openai(&harness).await;

    // Exactly one outbound reply across both deliveries.
    Mock::given(method("POST"))
        .and(path("/123456789/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "wamid.out.1" }],
        })))
        .expect(1)
        .mount(&harness.whatsapp)
        .await;

    // Exactly one cita created.
    Mock::given(method("POST"))
        .and(path("/citas/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "id": 501,
            "id_estado": 7,
            "nombre_paciente": "Ana Pérez",
        }})))
        .expect(1)
        .mount(&harness.dentalink)
        .await;

    let state = harness.state();
    let payload = delivery_payload();

    // First delivery.
    let response = webhook_routes(state.clone())
        .oneshot(webhook_request(&payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The worker drains the persisted intent and books the appointment.
    let worker = OutboxWorker::new(&harness.config, state.directory.clone());
    let intent = BookingIntent {
        id: Uuid::new_v4(),
        phone_number: PHONE.to_string(),
        user_message: CONFIRMATION.to_string(),
        status: IntentStatus::Pending,
        error: None,
        created_at: None,
        processed_at: None,
    };
    let outcome = worker.process_intent(&intent).await.unwrap();
    assert!(outcome.contains("appointment 501 created"));

    // Redelivery of the identical event id: no reply, no second booking.
    let response = webhook_routes(state)
        .oneshot(webhook_request(&payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn verification_echoes_the_challenge_on_token_match() {
    let harness = TestHarness::start().await;
    let state = harness.state();

    let request = Request::builder()
        .method("GET")
        .uri("/?hub.mode=subscribe&hub.verify_token=test-verify-token&hub.challenge=12345")
        .body(Body::empty())
        .unwrap();

    let response = webhook_routes(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&bytes), "12345");
}

#[tokio::test]
async fn verification_rejects_a_wrong_token() {
    let harness = TestHarness::start().await;
    let state = harness.state();

    let request = Request::builder()
        .method("GET")
        .uri("/?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=12345")
        .body(Body::empty())
        .unwrap();

    let response = webhook_routes(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_envelope_objects_are_not_processed() {
    let harness = TestHarness::start().await;
    let state = harness.state();

    let payload = json!({ "object": "page", "entry": [] });
    let response = webhook_routes(state)
        .oneshot(webhook_request(&payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
