use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

mod common;

#[tokio::test]
async fn test_missing_fields_report_every_error() {
    let app = common::TestApp::spawn().await;

    let resp = app.create(&json!({})).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"Error": "Validation Errors", "Details": ["Username is required", "Text is required"]}));
    assert!(app.repo.is_empty());
}

#[tokio::test]
async fn test_empty_body_is_treated_as_empty_object() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.post(format!("{}/chats", app.server_url)).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["Details"], json!(["Username is required", "Text is required"]));
}

#[tokio::test]
async fn test_wrong_types_are_rejected() {
    let app = common::TestApp::spawn().await;

    let resp = app.create(&json!({"username": 7, "text": true, "timeout": "soon"})).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["Details"],
        json!(["Username must be a string", "Text must be a string", "Timeout must be a number"])
    );
}

#[tokio::test]
async fn test_out_of_range_timeout_is_rejected() {
    let app = common::TestApp::spawn().await;

    let resp = app.create(&json!({"username": "a", "text": "b", "timeout": 1e300})).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["Details"], json!(["Timeout is out of range"]));
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = common::TestApp::spawn().await;

    let resp = app
        .client
        .post(format!("{}/chats", app.server_url))
        .header("Content-Type", "application/json")
        .body("{\"username\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"Error": "Malformed JSON body"}));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let app = common::TestApp::spawn().await;

    let resp = app.read(&Uuid::new_v4().to_string()).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"Error": "Resource could not be found"}));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.get(format!("{}/nowhere", app.server_url)).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
