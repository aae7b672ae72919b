//! HTTP client for the persistence and membership API.
//!
//! Every response body is the uniform `{ success, data | error }` envelope in
//! camelCase; bodies cross the same key-case boundary as websocket frames.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use envelopes::{Envelope, Sketch, from_wire_json, to_wire_json};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Error type for HTTP API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response body.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// A body could not be converted to or from JSON.
    #[error("json body error: {0}")]
    Json(#[from] serde_json::Error),
    /// The server answered with `success: false`.
    #[error("server error {code}: {message}")]
    Application { message: String, code: i32 },
    /// The server answered `success: true` without the expected data.
    #[error("response is missing data")]
    MissingData,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiFailure {
    pub message: String,
    #[serde(default)]
    pub code: i32,
}

/// Uniform response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiFailure>,
}

impl<T> ApiResponse<T> {
    /// # Errors
    ///
    /// Returns [`ApiError::Application`] for failed responses and
    /// [`ApiError::MissingData`] for successful ones without data.
    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(ApiError::MissingData),
            (false, _) => Err(Self::failure(self.error)),
        }
    }

    /// Like [`ApiResponse::into_result`] but for calls whose data is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Application`] for failed responses.
    pub fn into_unit(self) -> Result<(), ApiError> {
        if self.success { Ok(()) } else { Err(Self::failure(self.error)) }
    }

    fn failure(error: Option<ApiFailure>) -> ApiError {
        match error {
            Some(ApiFailure { message, code }) => ApiError::Application { message, code },
            None => ApiError::Application { message: "request failed".to_owned(), code: 0 },
        }
    }
}

/// Identity behind a session token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct NewSketch<'a> {
    display_name: &'a str,
    width: u32,
    height: u32,
}

/// Bearer-token client for one session.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_owned(), token: token.to_owned() }
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the token is rejected.
    pub async fn validate_token(&self) -> Result<UserInfo, ApiError> {
        self.call(Method::GET, "/api/auth/validate", None).await?.into_result()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the server refuses.
    pub async fn join_channel(&self, channel: &str) -> Result<(), ApiError> {
        self.call::<Value>(Method::POST, &format!("/api/channels/{channel}/join"), None).await?.into_unit()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the server refuses.
    pub async fn leave_channel(&self, channel: &str) -> Result<(), ApiError> {
        self.call::<Value>(Method::POST, &format!("/api/channels/{channel}/leave"), None).await?.into_unit()
    }

    /// Recent chat history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the body is malformed.
    pub async fn message_history(&self, channel: &str) -> Result<Vec<Envelope>, ApiError> {
        self.call(Method::GET, &format!("/api/channels/{channel}/messages"), None).await?.into_result()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the body is malformed.
    pub async fn list_sketches(&self, channel: &str) -> Result<Vec<Sketch>, ApiError> {
        self.call(Method::GET, &format!("/api/channels/{channel}/sketches"), None).await?.into_result()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the sketch is unknown.
    pub async fn get_sketch(&self, sketch_id: &str) -> Result<Sketch, ApiError> {
        self.call(Method::GET, &format!("/api/sketches/{sketch_id}"), None).await?.into_result()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the server refuses.
    pub async fn create_sketch(
        &self,
        channel: &str,
        display_name: &str,
        width: u32,
        height: u32,
    ) -> Result<Sketch, ApiError> {
        let body = to_wire_json(&NewSketch { display_name, width, height })?;
        self.call(Method::POST, &format!("/api/channels/{channel}/sketches"), Some(body)).await?.into_result()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the server refuses.
    pub async fn delete_sketch(&self, sketch_id: &str) -> Result<(), ApiError> {
        self.call::<Value>(Method::DELETE, &format!("/api/sketches/{sketch_id}"), None).await?.into_unit()
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the server refuses.
    pub async fn clear_sketch(&self, sketch_id: &str) -> Result<(), ApiError> {
        self.call::<Value>(Method::POST, &format!("/api/sketches/{sketch_id}/clear"), None).await?.into_unit()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse<T>, ApiError> {
        let url = self.endpoint(path);
        debug!(%method, %url, "api request");
        let request = self.http.request(method, &url).bearer_auth(&self.token);
        let request = if let Some(json) = body { request.json(&json) } else { request };
        let raw: Value = request.send().await?.json().await?;
        decode_response(raw)
    }
}

/// Convert a raw wire body into a typed response.
///
/// # Errors
///
/// Returns [`ApiError::Json`] if the body does not match `ApiResponse<T>`.
pub fn decode_response<T: DeserializeOwned>(raw: Value) -> Result<ApiResponse<T>, ApiError> {
    Ok(from_wire_json(raw)?)
}
