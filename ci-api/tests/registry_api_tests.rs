//! Integration tests for the registry instrument endpoints

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use helpers::*;
use serde_json::{json, Value};

fn payload() -> Value {
    json!({
        "ci_version": 1,
        "classifier_type": "form_type",
        "classifier_value": "0001",
        "exercise_id": EXERCISE_ID,
        "guid": "c7a5a1a2-4f6b-4c36-8e47-6e8c5a4f3b21",
        "instrument_id": "dfc3ddd7-3e79-4c6b-a8f8-1fa184cdd06b",
        "published_at": "2025-12-31T00:00:00",
        "survey_id": SURVEY_ID
    })
}

fn exercise_uri(exercise_id: &str) -> String {
    format!("{}/registry-instrument/exercise-id/{}", INSTRUMENT_API, exercise_id)
}

fn form_type_uri(form_type: &str) -> String {
    format!("{}/formtype/{}", exercise_uri(EXERCISE_ID), form_type)
}

#[tokio::test]
async fn test_upsert_creates_then_updates() {
    let app = TestApp::new().await;

    let (status, body) = app.send(request("PUT", &exercise_uri(EXERCISE_ID), Some(payload()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "Successfully saved registry instrument");

    let mut updated = payload();
    updated["ci_version"] = json!(2);
    let (status, _) = app.send(request("PUT", &exercise_uri(EXERCISE_ID), Some(updated))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, row) = app.send_json(request("GET", &form_type_uri("0001"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["ci_version"], 2);
    assert_eq!(row["classifier_value"], "0001");

    let (status, rows) = app.send_json(request("GET", &exercise_uri(EXERCISE_ID), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_is_ordered_and_counted() {
    let app = TestApp::new().await;
    for form_type in ["0002", "0001"] {
        let mut p = payload();
        p["classifier_value"] = json!(form_type);
        let (status, _) = app.send(request("PUT", &exercise_uri(EXERCISE_ID), Some(p))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, rows) = app.send_json(request("GET", &exercise_uri(EXERCISE_ID), None)).await;
    let values: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["classifier_value"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["0001", "0002"]);

    let uri = format!("{}/count", exercise_uri(EXERCISE_ID));
    let (status, body) = app.send_json(request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "registry_instrument_count": 2 }));

    let uri = format!("{}/count", exercise_uri(OTHER_EXERCISE_ID));
    let (_, body) = app.send_json(request("GET", &uri, None)).await;
    assert_eq!(body, json!({ "registry_instrument_count": 0 }));
}

#[tokio::test]
async fn test_delete() {
    let app = TestApp::new().await;
    app.send(request("PUT", &exercise_uri(EXERCISE_ID), Some(payload()))).await;

    let (status, body) = app.send(request("DELETE", &form_type_uri("0001"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Successfully deleted registry instrument");

    let (status, body) = app.send(request("DELETE", &form_type_uri("0001"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    let (status, body) = app.send(request("GET", &form_type_uri("0001"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    let (status, body) = app.send(request("GET", &exercise_uri(EXERCISE_ID), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");
}

#[tokio::test]
async fn test_payload_validation() {
    let app = TestApp::new().await;

    let mut missing_guid = payload();
    missing_guid.as_object_mut().unwrap().remove("guid");
    let (status, body) = app
        .send(request("PUT", &exercise_uri(EXERCISE_ID), Some(missing_guid)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid payload keys"));

    let mut bad_value = payload();
    bad_value["classifier_value"] = json!("abcd");
    let (status, body) = app
        .send(request("PUT", &exercise_uri(EXERCISE_ID), Some(bad_value)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid classifier value");

    let (status, body) = app
        .send(request("PUT", &exercise_uri(OTHER_EXERCISE_ID), Some(payload())))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "exercise_id in payload does not match path parameter");

    let raw = Request::builder()
        .method("PUT")
        .uri(exercise_uri(EXERCISE_ID))
        .header(header::AUTHORIZATION, basic_auth())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(raw).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid JSON payload");
}

#[tokio::test]
async fn test_invalid_exercise_id_in_path() {
    let app = TestApp::new().await;
    let (status, body) = app.send(request("GET", &exercise_uri("nope"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Value is not a valid UUID (nope)");
}
