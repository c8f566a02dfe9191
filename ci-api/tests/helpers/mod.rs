//! Shared fixtures for ci-api integration tests
//!
//! One stub server plays all four upstream services; the app under test is
//! driven through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ci_api::clients::ServiceClient;
use ci_api::config::Config;
use ci_api::db::Store;
use ci_api::egress::{ResponseEgress, SurveyResponse};
use ci_api::error::{ApiError, ApiResult};
use ci_api::publisher::MessagePublisher;
use ci_api::{build_router, AppState};
use ci_common::db::{init_database, init_memory_database, PoolSettings};
use sqlx::SqlitePool;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

pub const INSTRUMENT_API: &str = ci_api::INSTRUMENT_API;
pub const SURVEY_RESPONSE_API: &str = ci_api::SURVEY_RESPONSE_API;

pub const SURVEY_ID: &str = "cb0711c3-0ac8-41d3-ae0e-567e5ea1ef87";
pub const EXERCISE_ID: &str = "c046861a-0df7-443a-a963-d9aa3bddf328";
pub const OTHER_EXERCISE_ID: &str = "3ff59b73-7f15-406f-9e4d-7f00b41e85ce";
pub const CASE_ID: &str = "bb2b6b3d-4e0b-4bb0-a6e5-3b3f8e2a0f55";
pub const PARTY_ID: &str = "db036fd7-ce17-40c2-a8fc-932e7c228397";
pub const RU_REF: &str = "12345678901";

/// What the stub upstream has been asked
#[derive(Default)]
pub struct UpstreamLog {
    pub link_calls: Mutex<Vec<Value>>,
    pub fail_links: Mutex<bool>,
    pub drop_check_letter: Mutex<bool>,
}

async fn case(Path(case_id): Path<String>) -> Response {
    if case_id != CASE_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "id": CASE_ID,
        "caseGroup": {
            "sampleUnitRef": RU_REF,
            "collectionExerciseId": EXERCISE_ID,
            "partyId": PARTY_ID,
        }
    }))
    .into_response()
}

async fn collection_exercise(Path(exercise_id): Path<String>) -> Json<Value> {
    Json(json!({
        "id": exercise_id,
        "exerciseRef": "221_201712",
        "surveyId": SURVEY_ID,
    }))
}

async fn survey(Path(survey_id): Path<String>) -> Json<Value> {
    Json(json!({ "id": survey_id, "surveyRef": "023" }))
}

async fn business(State(log): State<Arc<UpstreamLog>>, Path(party_id): Path<String>) -> Json<Value> {
    if *log.drop_check_letter.lock().unwrap() {
        return Json(json!({ "id": party_id, "name": "Bolts and Ratchets" }));
    }
    Json(json!({ "id": party_id, "name": "Bolts and Ratchets", "checkletter": "A" }))
}

async fn link(State(log): State<Arc<UpstreamLog>>, Json(body): Json<Value>) -> StatusCode {
    log.link_calls.lock().unwrap().push(body);
    if *log.fail_links.lock().unwrap() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

/// Start the upstream stub and return its base URL
pub async fn spawn_upstream(log: Arc<UpstreamLog>) -> String {
    let app = Router::new()
        .route("/cases/:id", get(case))
        .route("/collectionexercises/:id", get(collection_exercise))
        .route("/surveys/:id", get(survey))
        .route("/party-api/v1/businesses/id/:id", get(business))
        .route("/collection-instrument/link", post(link))
        .with_state(log);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Broker stand-in that keeps every message
#[derive(Default)]
pub struct RecordingPublisher {
    pub messages: Mutex<Vec<Value>>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, body: &[u8], _tx_id: Option<&str>) -> ApiResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(ApiError::Publish("broker unavailable".to_string()));
        }
        let value = serde_json::from_slice(body).unwrap_or(Value::Null);
        self.messages.lock().unwrap().push(value);
        Ok(())
    }
}

/// Survey response egress stand-in
#[derive(Default)]
pub struct RecordingEgress {
    pub responses: Mutex<Vec<SurveyResponse>>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl ResponseEgress for RecordingEgress {
    async fn hand_off(&self, response: &SurveyResponse) -> ApiResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(ApiError::Publish("broker unavailable".to_string()));
        }
        self.responses.lock().unwrap().push(response.clone());
        Ok(())
    }
}

/// App under test with handles on every fake it talks to
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub upstream: Arc<UpstreamLog>,
    pub events: Arc<RecordingPublisher>,
    pub egress: Arc<RecordingEgress>,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = init_memory_database().await.expect("Failed to create in-memory database");
        Self::with_pool(pool).await
    }

    /// App over a WAL database file with a multi-connection pool
    pub async fn on_disk(dir: &tempfile::TempDir) -> Self {
        let uri = format!("sqlite://{}?mode=rwc", dir.path().join("ci.db").display());
        let settings = PoolSettings {
            size: 4,
            max_overflow: 4,
            ..PoolSettings::default()
        };
        let pool = init_database(&uri, settings).await.expect("Failed to create database file");
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Self {
        let upstream = Arc::new(UpstreamLog::default());
        let base_url = spawn_upstream(upstream.clone()).await;

        let mut config = Config::for_testing();
        config.case_url = base_url.clone();
        config.collection_exercise_url = base_url.clone();
        config.survey_url = base_url.clone();
        config.party_url = base_url;

        let clients = ServiceClient::from_config(&config).unwrap();
        let events = Arc::new(RecordingPublisher::default());
        let egress = Arc::new(RecordingEgress::default());

        let state = AppState::new(Store::new(pool), config, clients, events.clone(), egress.clone());
        let router = build_router(state.clone());

        Self {
            router,
            state,
            upstream,
            events,
            egress,
        }
    }

    /// Send a request and return status and body text
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    /// Send a request and decode a JSON body
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = serde_json::from_str(&body).unwrap_or(Value::Null);
        (status, value)
    }
}

pub fn basic_auth() -> String {
    format!("Basic {}", STANDARD.encode("admin:secret"))
}

const BOUNDARY: &str = "X-CI-TEST-BOUNDARY";

/// Multipart body with a single `file` field
pub fn multipart_body(file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/vnd.ms-excel\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Authenticated multipart request
pub fn upload_request(method: &str, uri: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(file_name, data)))
        .unwrap()
}

/// Authenticated request with an optional JSON body
pub fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth());
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Percent-encode a query value
pub fn encode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Upload a SEFT instrument through the API and return its id
pub async fn upload_seft(app: &TestApp, exercise_id: &str, ru_ref: Option<&str>) -> (StatusCode, String) {
    let uri = match ru_ref {
        Some(ru_ref) => format!("{}/upload/{}/{}", INSTRUMENT_API, exercise_id, ru_ref),
        None => format!("{}/upload/{}", INSTRUMENT_API, exercise_id),
    };
    app.send(upload_request("POST", &uri, "return.xlsx", b"spreadsheet bytes"))
        .await
}

/// Ids of every stored instrument, newest first
pub async fn instrument_ids(app: &TestApp, search: Option<Value>) -> Vec<String> {
    let uri = match search {
        Some(search) => format!(
            "{}/collectioninstrument?searchString={}",
            INSTRUMENT_API,
            encode(&search.to_string())
        ),
        None => format!("{}/collectioninstrument", INSTRUMENT_API),
    };
    let (status, body) = app.send_json(request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .unwrap()
        .iter()
        .map(|v| v["instrument_id"].as_str().unwrap().to_string())
        .collect()
}
