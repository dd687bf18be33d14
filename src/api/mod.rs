//! Wire-level surface of the transactional API.
//!
//! The engine never talks HTTP itself; it hands an [`ApiRequest`] to a
//! [`TransactionClient`] implementation and gets an [`ApiResponse`] back.
//! Trace ids and HTTP status travel as explicit values on these types so
//! they can be threaded into step results without ambient thread state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound API call, fully built from a chain step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    /// Generated per invocation; echoed into the step result.
    pub trace_id: String,
    pub body: Value,
}

impl ApiRequest {
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            trace_id: Uuid::new_v4().to_string(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            trace_id: Uuid::new_v4().to_string(),
            body: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub trace_id: Option<String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            trace_id: None,
            body,
        }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            trace_id: None,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The external operation capability: transports a built request and returns
/// the raw response. Implementations live outside the engine; tests script
/// one. `Err` means the call never produced a response (connection failure,
/// timeout in the transport); HTTP-level failures come back as an
/// [`ApiResponse`] with a non-2xx status.
#[async_trait]
pub trait TransactionClient: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse>;
}

/// Parsed error information from a failed invocation, kept alongside the raw
/// response body for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub response_body: Option<String>,
}

impl ErrorDetail {
    /// Extract `title`/`detail` from a problem-details style JSON body,
    /// falling back to the raw (truncated) body text.
    pub fn from_response(response: &ApiResponse) -> Self {
        let mut info = Self::default();
        if response.body.is_null() {
            info.detail = Some(format!("HTTP status {}", response.status));
            return info;
        }
        info.response_body = serde_json::to_string(&response.body).ok();
        if let Some(object) = response.body.as_object() {
            info.title = object.get("title").and_then(Value::as_str).map(String::from);
            info.detail = object
                .get("detail")
                .and_then(Value::as_str)
                .map(String::from);
        }
        if info.title.is_none() && info.detail.is_none() {
            let raw = response.body.to_string();
            info.detail = Some(if raw.chars().count() > 200 {
                format!("{}...", raw.chars().take(200).collect::<String>())
            } else {
                raw
            });
        }
        info
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            title: None,
            detail: Some(message.into()),
            response_body: None,
        }
    }
}
