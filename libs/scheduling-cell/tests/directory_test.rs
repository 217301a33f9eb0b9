use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::ClinicLocation;
use scheduling_cell::services::directory::{ClinicDirectory, Clock};
use shared_utils::test_utils::TestConfig;

struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

async fn mount_directory(dentalink: &MockServer, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path("/sucursales/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
            { "id": 10, "nombre": "Clínica El Rodadero" },
            { "id": 11, "nombre": "Sede Manzanares" },
        ]})))
        .expect(expected_fetches)
        .mount(dentalink)
        .await;
    Mock::given(method("GET"))
        .and(path("/dentistas/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
            { "id": 3, "nombre": "Otra Dentista", "email": "otra@example.com" },
            { "id": 7, "nombre": "Dr. Albeiro García", "email": "dr@example.com" },
        ]})))
        .expect(expected_fetches)
        .mount(dentalink)
        .await;
}

fn directory_with_clock(dentalink: &MockServer, clock: Arc<ManualClock>) -> ClinicDirectory {
    let config = TestConfig {
        dentalink_base_url: dentalink.uri(),
        ..TestConfig::default()
    }
    .to_app_config();

    ClinicDirectory::with_clock(&config, clock)
}

#[tokio::test]
async fn snapshot_is_cached_within_the_ttl() {
    let dentalink = MockServer::start().await;
    mount_directory(&dentalink, 1).await;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let directory = directory_with_clock(&dentalink, Arc::clone(&clock));

    let first = directory.get_or_refresh().await.unwrap();
    clock.advance(Duration::minutes(30));
    let second = directory.get_or_refresh().await.unwrap();

    assert_eq!(first.branch_by_location, second.branch_by_location);
    assert_eq!(
        first.branch_by_location.get(&ClinicLocation::Manzanares),
        Some(&11)
    );
    // The lead dentist wins over list order.
    assert_eq!(first.default_dentist_id, Some(7));
}

#[tokio::test]
async fn snapshot_is_refetched_after_the_ttl_expires() {
    let dentalink = MockServer::start().await;
    mount_directory(&dentalink, 2).await;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let directory = directory_with_clock(&dentalink, Arc::clone(&clock));

    directory.get_or_refresh().await.unwrap();
    clock.advance(Duration::minutes(61));
    directory.get_or_refresh().await.unwrap();
}
