//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all score-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use std::time::Duration;

/// HTTP test client with header-based identity
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// The user id sent in the X-User-Id header
    pub user_id: String,
}

impl TestClient {
    /// Creates a client acting as `user_id`
    pub fn for_user(base_url: String, user_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            user_id: user_id.to_string(),
        }
    }

    /// Creates a client acting as the default test user
    pub fn new(base_url: String) -> Self {
        Self::for_user(base_url, TEST_USER)
    }

    // ========================================================================
    // Score Endpoints
    // ========================================================================

    /// POST /v1/score/upload
    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Response {
        self.upload_with(bytes, filename, None, None).await
    }

    /// POST /v1/score/upload with optional overwrite and date query parameters
    pub async fn upload_with(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        overwrite: Option<bool>,
        date: Option<&str>,
    ) -> Response {
        let mut url = format!("{}/v1/score/upload", self.base_url);
        let mut params = vec![];
        if let Some(overwrite) = overwrite {
            params.push(format!("overwrite={}", overwrite));
        }
        if let Some(date) = date {
            params.push(format!("date={}", date));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        self.client
            .post(&url)
            .header("X-User-Id", &self.user_id)
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    /// POST /v1/score/upload with an empty multipart form (no file field)
    pub async fn upload_without_file(&self) -> Response {
        let form = Form::new().text("note", "no file here");
        self.client
            .post(format!("{}/v1/score/upload", self.base_url))
            .header("X-User-Id", &self.user_id)
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    /// GET /v1/score/job/{id}
    pub async fn job_status(&self, job_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/score/job/{}", self.base_url, job_id))
            .header("X-User-Id", &self.user_id)
            .send()
            .await
            .expect("Job status request failed")
    }

    /// Polls GET /v1/score/job/{id} until the job leaves the queue
    ///
    /// Returns the final job status body.
    ///
    /// # Panics
    ///
    /// Panics if the job is still pending or running after the timeout.
    pub async fn wait_for_job(&self, job_id: &str) -> serde_json::Value {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(JOB_DONE_TIMEOUT_MS);

        loop {
            let response = self.job_status(job_id).await;
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let body: serde_json::Value =
                response.json().await.expect("Job status body was not JSON");

            match body["status"].as_str() {
                Some("done") | Some("failed") => return body,
                _ => {}
            }

            if start.elapsed() > timeout {
                panic!(
                    "Job {} did not finish within {}ms, last status: {}",
                    job_id, JOB_DONE_TIMEOUT_MS, body
                );
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }
    }

    /// GET /v1/score/history
    pub async fn history(&self) -> Response {
        self.history_with(None, None).await
    }

    /// GET /v1/score/history with limit and offset
    pub async fn history_with(&self, limit: Option<usize>, offset: Option<usize>) -> Response {
        let mut url = format!("{}/v1/score/history", self.base_url);
        let mut params = vec![];
        if let Some(limit) = limit {
            params.push(format!("limit={}", limit));
        }
        if let Some(offset) = offset {
            params.push(format!("offset={}", offset));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }
        self.client
            .get(&url)
            .header("X-User-Id", &self.user_id)
            .send()
            .await
            .expect("History request failed")
    }

    /// GET /v1/score/profile
    pub async fn profile(&self) -> Response {
        self.client
            .get(format!("{}/v1/score/profile", self.base_url))
            .header("X-User-Id", &self.user_id)
            .send()
            .await
            .expect("Profile request failed")
    }

    // ========================================================================
    // Health Check / System Endpoints
    // ========================================================================

    /// GET /
    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }
}
