use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::metrics::track_api_request;
use crate::models::result::ResultResponse;
use crate::models::{
    RequestOptions, SaveAnswersRequest, SaveAnswersResponse, StartAttemptResponse,
    SubmitAttemptRequest, SubmitAttemptResponse,
};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Backend answered with a non-success status
    #[error("{detail}")]
    Status { status: u16, detail: String },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("Request was aborted: {0}")]
    Aborted(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided detail, if the failure came from the backend.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Text shown to the student: backend detail when present, `fallback` otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        self.detail()
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Operations of the test backend used by an attempt screen.
#[async_trait]
pub trait AttemptApi: Send + Sync {
    /// Starts the attempt, or returns the running one with its saved answers.
    async fn start_attempt(
        &self,
        test_id: &str,
        credential: &str,
    ) -> Result<StartAttemptResponse, ApiError>;

    async fn save_answers(
        &self,
        attempt_id: &str,
        credential: &str,
        request: &SaveAnswersRequest,
    ) -> Result<SaveAnswersResponse, ApiError>;

    async fn submit_attempt(
        &self,
        attempt_id: &str,
        credential: &str,
        request: &SubmitAttemptRequest,
        options: RequestOptions,
    ) -> Result<SubmitAttemptResponse, ApiError>;

    async fn get_result(
        &self,
        attempt_id: &str,
        credential: &str,
    ) -> Result<ResultResponse, ApiError>;
}

/// `AttemptApi` over the REST backend.
#[derive(Debug, Clone)]
pub struct HttpAttemptApi {
    http_client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpAttemptApi {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder, credential: &str) -> RequestBuilder {
        request
            .bearer_auth(credential)
            .header(header::CACHE_CONTROL, "no-store")
            .timeout(self.request_timeout)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(status.as_u16(), &body);
            tracing::debug!("Backend returned {}: {}", status, detail);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn send_submit(
        &self,
        attempt_id: &str,
        credential: &str,
        request: &SubmitAttemptRequest,
    ) -> Result<SubmitAttemptResponse, ApiError> {
        let url = self.endpoint(&["student", "attempts", attempt_id, "submit"])?;
        let builder = self.authorized(self.http_client.post(url), credential).json(request);
        self.send(builder).await
    }
}

#[async_trait]
impl AttemptApi for HttpAttemptApi {
    async fn start_attempt(
        &self,
        test_id: &str,
        credential: &str,
    ) -> Result<StartAttemptResponse, ApiError> {
        track_api_request("start_attempt", async {
            let url = self.endpoint(&["student", "tests", test_id, "start"])?;
            self.send(self.authorized(self.http_client.post(url), credential))
                .await
        })
        .await
    }

    async fn save_answers(
        &self,
        attempt_id: &str,
        credential: &str,
        request: &SaveAnswersRequest,
    ) -> Result<SaveAnswersResponse, ApiError> {
        track_api_request("save_answers", async {
            let url = self.endpoint(&["student", "attempts", attempt_id, "answers"])?;
            let builder = self
                .authorized(self.http_client.post(url), credential)
                .json(request);
            self.send(builder).await
        })
        .await
    }

    async fn submit_attempt(
        &self,
        attempt_id: &str,
        credential: &str,
        request: &SubmitAttemptRequest,
        options: RequestOptions,
    ) -> Result<SubmitAttemptResponse, ApiError> {
        track_api_request("submit_attempt", async {
            if !options.keepalive {
                return self.send_submit(attempt_id, credential, request).await;
            }

            // Detached so the request still completes if the screen is torn down
            let api = self.clone();
            let attempt_id = attempt_id.to_string();
            let credential = credential.to_string();
            let request = request.clone();
            tokio::spawn(async move { api.send_submit(&attempt_id, &credential, &request).await })
                .await
                .map_err(|e| ApiError::Aborted(e.to_string()))?
        })
        .await
    }

    async fn get_result(
        &self,
        attempt_id: &str,
        credential: &str,
    ) -> Result<ResultResponse, ApiError> {
        track_api_request("get_result", async {
            let url = self.endpoint(&["student", "results", attempt_id])?;
            self.send(self.authorized(self.http_client.get(url), credential))
                .await
        })
        .await
    }
}

/// Extracts the human-readable detail from a backend error body.
///
/// Accepts `{"detail": "..."}` and validation lists (`{"detail": [{"msg": ".."}, ".."]}`).
pub fn error_detail(status: u16, body: &str) -> String {
    let fallback = format!("Request failed ({})", status);

    let payload: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return fallback,
    };

    let detail = match payload.get("detail") {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                serde_json::Value::String(text) => Some(text.as_str()),
                serde_json::Value::Object(map) => map.get("msg").and_then(|msg| msg.as_str()),
                _ => None,
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };

    if detail.is_empty() {
        fallback
    } else {
        detail
    }
}
