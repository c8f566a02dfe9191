//! Integration tests for the survey response endpoint

mod helpers;

use axum::http::StatusCode;
use helpers::*;

fn response_uri(case_id: &str) -> String {
    format!("{}/survey_responses/{}", SURVEY_RESPONSE_API, case_id)
}

#[tokio::test]
async fn test_response_is_named_and_handed_off() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(upload_request("POST", &response_uri(CASE_ID), "return.xlsx", b"answers"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Upload successful");

    let responses = app.egress.responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    let response = &responses[0];
    assert!(response.filename.starts_with("12345678901A_201712_023_"));
    assert_eq!(response.filename.len(), "12345678901A_201712_023_".len() + 14);
    assert_eq!(response.case_id, CASE_ID);
    assert_eq!(response.survey_ref, "023");
    assert_eq!(response.ru_ref, RU_REF);
    assert_eq!(response.file, b"answers");
}

#[tokio::test]
async fn test_hand_off_failure() {
    let app = TestApp::new().await;
    *app.egress.fail.lock().unwrap() = true;

    let (status, body) = app
        .send(upload_request("POST", &response_uri(CASE_ID), "return.xlsx", b"answers"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Upload failed");
}

#[tokio::test]
async fn test_file_checks() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(upload_request("POST", &response_uri(CASE_ID), "return.csv", b"answers"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "The spreadsheet must be in .xls or .xlsx format");

    // Extension matching is case-sensitive
    let (status, _) = app
        .send(upload_request("POST", &response_uri(CASE_ID), "return.XLSX", b"answers"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long_name = format!("{}.xlsx", "a".repeat(51));
    let (status, body) = app
        .send(upload_request("POST", &response_uri(CASE_ID), &long_name, b"answers"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "The file name of your spreadsheet must be less than 50 characters long"
    );

    let limit_name = format!("{}.xlsx", "a".repeat(50));
    let (status, _) = app
        .send(upload_request("POST", &response_uri(CASE_ID), &limit_name, b"answers"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(upload_request("POST", &response_uri(CASE_ID), "return.xlsx", b""))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "File too small");

    assert_eq!(app.egress.responses.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_upstream_data() {
    let app = TestApp::new().await;

    // Unknown case
    let other_case = "0d1cd9b6-4ae1-4b0c-9a56-7ab1f4b6c0de";
    let (status, _) = app
        .send(upload_request("POST", &response_uri(other_case), "return.xlsx", b"answers"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    *app.upstream.drop_check_letter.lock().unwrap() = true;
    let (status, body) = app
        .send(upload_request("POST", &response_uri(CASE_ID), "return.xlsx", b"answers"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Check letter"));
    assert!(app.egress.responses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_case_id() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(upload_request("POST", &response_uri("nope"), "return.xlsx", b"answers"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Value is not a valid UUID (nope)");
}
