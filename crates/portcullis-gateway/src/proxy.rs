//! Forwarding to the internal AI service.
//!
//! The client has a connect timeout only; the request timeout bounds the
//! time until response headers arrive (and the body read for JSON replies).
//! Event streams are passed through chunk by chunk without a total deadline.

use crate::config::AiServiceConfig;
use crate::error::ApiError;
use axum::{
    body::Body,
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Correlation header attached to every forwarded request
pub const HEADER_REQUEST_ID: &str = "x-request-id";

const EVENT_STREAM: &str = "text/event-stream";
const GENERIC_UPSTREAM_MESSAGE: &str = "AI service request failed";

/// A request ready to be sent downstream
#[derive(Debug)]
pub struct ForwardRequest {
    /// HTTP method from the client
    pub method: Method,
    /// Path under `/internal/ai/`
    pub internal_path: String,
    /// Raw query string from the client
    pub query: Option<String>,
    /// Exact body bytes (already signed)
    pub body: Vec<u8>,
    /// Signing and forwarding headers
    pub headers: HeaderMap,
}

/// HTTP client for the AI service
pub struct AiServiceClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl AiServiceClient {
    /// Create a client from configuration
    pub fn new(config: &AiServiceConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Full downstream URL for an internal path
    pub fn internal_url(&self, internal_path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/internal/ai/{}", self.base_url, internal_path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Send a request and translate the reply for the browser
    pub async fn forward(&self, request: ForwardRequest) -> Result<Response, ApiError> {
        let url = self.internal_url(&request.internal_path, request.query.as_deref());
        debug!(method = %request.method, url = %url, "Forwarding to AI service");

        let send = self
            .client
            .request(request.method, &url)
            .headers(request.headers)
            .body(request.body)
            .send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Err(_) => {
                warn!(url = %url, "AI service timed out");
                return Err(ApiError::Upstream("request timed out".to_string()));
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "AI service unreachable");
                return Err(ApiError::Upstream(e.to_string()));
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if is_event_stream(response.headers()) {
            return Ok(stream_response(status, response));
        }

        let bytes = match tokio::time::timeout(self.timeout, response.bytes()).await {
            Err(_) => {
                warn!(url = %url, "AI service response body timed out");
                return Err(ApiError::Upstream("response body timed out".to_string()));
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Failed to read AI service response");
                return Err(ApiError::Upstream(e.to_string()));
            }
            Ok(Ok(bytes)) => bytes,
        };

        relay(status, &bytes)
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with(EVENT_STREAM))
        .unwrap_or(false)
}

/// Pass an event stream through without buffering
fn stream_response(status: StatusCode, response: reqwest::Response) -> Response {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(EVENT_STREAM));

    let mut out = Response::new(Body::from_stream(response.bytes_stream()));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    out
}

/// Translate a buffered downstream reply
fn relay(status: StatusCode, bytes: &[u8]) -> Result<Response, ApiError> {
    if status.is_success() {
        if bytes.is_empty() {
            return Ok(status.into_response());
        }
        return match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Ok((status, Json(value)).into_response()),
            Err(e) => {
                warn!(error = %e, "AI service returned a non-JSON body");
                Err(ApiError::Upstream("invalid response body".to_string()))
            }
        };
    }

    let message = error_message(bytes).unwrap_or_else(|| GENERIC_UPSTREAM_MESSAGE.to_string());
    warn!(status = %status, message = %message, "AI service returned an error");
    Err(ApiError::UpstreamApplication { status, message })
}

/// Pull a human-readable message out of a downstream error body
fn error_message(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let candidates = [
        value.get("message"),
        value.get("detail"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .map(str::to_string);
    message
}
