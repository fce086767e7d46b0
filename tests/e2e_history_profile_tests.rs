//! End-to-end tests for score history and the profile summary

mod common;

use common::{fixtures, TestClient, TestServer};
use reqwest::StatusCode;

async fn upload_on_day(client: &TestClient, day: &str) -> serde_json::Value {
    let response = client
        .upload_with(
            fixtures::short_wav_bytes(),
            &format!("clip-{}.wav", day),
            None,
            Some(day),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK, "upload for {}", day);
    response.json().await.unwrap()
}

#[tokio::test]
async fn history_is_newest_first() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    upload_on_day(&client, "2024-06-01").await;
    upload_on_day(&client, "2024-06-02").await;
    upload_on_day(&client, "2024-06-03").await;

    let response = client.history().await;
    assert_eq!(response.status(), StatusCode::OK);
    let records: serde_json::Value = response.json().await.unwrap();
    let records = records.as_array().unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["local_day"], serde_json::json!("2024-06-03"));
    assert_eq!(records[1]["local_day"], serde_json::json!("2024-06-02"));
    assert_eq!(records[2]["local_day"], serde_json::json!("2024-06-01"));
}

#[tokio::test]
async fn history_pagination() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    for day in ["2024-06-01", "2024-06-02", "2024-06-03"] {
        upload_on_day(&client, day).await;
    }

    let page: serde_json::Value = client
        .history_with(Some(2), None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page.as_array().unwrap().len(), 2);

    let rest: serde_json::Value = client
        .history_with(Some(2), Some(2))
        .await
        .json()
        .await
        .unwrap();
    let rest = rest.as_array().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0]["local_day"], serde_json::json!("2024-06-01"));
}

#[tokio::test]
async fn history_is_scoped_to_user() {
    let server = TestServer::spawn().await;
    let client_a = TestClient::new(server.base_url.clone());
    let client_b = TestClient::for_user(server.base_url.clone(), common::OTHER_USER);

    upload_on_day(&client_a, "2024-06-01").await;

    let records: serde_json::Value = client_b.history().await.json().await.unwrap();
    assert_eq!(records, serde_json::json!([]));
}

#[tokio::test]
async fn profile_is_null_safe_for_new_user() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.profile().await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["baseline"].is_null());
    assert!(body["latest"].is_null());
    assert!(body["deviation"].is_null());
}

#[tokio::test]
async fn profile_reflects_uploads() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    // Fallback uploads score a flat 50, so the arithmetic is predictable
    upload_on_day(&client, "2024-06-01").await;
    upload_on_day(&client, "2024-06-02").await;

    let body: serde_json::Value = client.profile().await.json().await.unwrap();
    assert_eq!(body["baseline"], serde_json::json!(50.0));
    assert_eq!(body["latest"]["score"], serde_json::json!(50));
    assert_eq!(body["deviation"], serde_json::json!(0.0));
}

#[tokio::test]
async fn baseline_is_anchored_to_earliest_recordings() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    // Five fallback days anchor the baseline at 50
    for day in [
        "2024-06-01",
        "2024-06-02",
        "2024-06-03",
        "2024-06-04",
        "2024-06-05",
    ] {
        upload_on_day(&client, day).await;
    }

    let before: serde_json::Value = client.profile().await.json().await.unwrap();
    assert_eq!(before["baseline"], serde_json::json!(50.0));

    // A sixth recording gets a real analyzed score but must not move the
    // anchor
    let response = client
        .upload_with(
            fixtures::speech_wav_bytes(6.0),
            "clip-6.wav",
            None,
            Some("2024-06-06"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let upload_body: serde_json::Value = response.json().await.unwrap();
    let job_id = upload_body["job_id"].as_str().unwrap().to_string();
    client.wait_for_job(&job_id).await;

    let after: serde_json::Value = client.profile().await.json().await.unwrap();
    assert_eq!(after["baseline"], serde_json::json!(50.0));

    let latest = after["latest"]["score"].as_i64().unwrap();
    let deviation = after["deviation"].as_f64().unwrap();
    assert!((deviation - (latest as f64 - 50.0)).abs() < 1e-9);
}

#[tokio::test]
async fn profile_requires_identity() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .client
        .get(format!("{}/v1/score/profile", client.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
