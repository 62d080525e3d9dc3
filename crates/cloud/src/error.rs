//! Internal error taxonomy for backend HTTP calls.
//!
//! None of these escape the dispatcher: each is folded into a FAILED
//! record through [`ClientError::into_failure`].

use gendispatch_core::error::NormalizationError;
use gendispatch_core::job::JobFailure;
use gendispatch_core::normalize;

/// Longest slice of a raw error body kept in a failure message.
const MAX_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (connect, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A gateway in front of the worker answered 502/503/504.
    #[error("Upstream unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// The requested job or endpoint does not exist.
    #[error("Not found (HTTP 404)")]
    NotFound,

    /// The service answered with another non-2xx status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

impl ClientError {
    /// Whether the condition may clear up by itself while polling.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Unavailable { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound | Self::Normalization(_) => false,
        }
    }

    /// Fold into the failure carried by a FAILED record.
    ///
    /// Connection-level problems and unreachable-upstream gateway answers
    /// are classified as transport; everything the service said itself
    /// is a backend failure.
    pub fn into_failure(self) -> JobFailure {
        match self {
            Self::Transport(ref e) if e.is_decode() => {
                JobFailure::from(NormalizationError(format!("undecodable body: {e}")))
            }
            Self::Transport(_) | Self::Unavailable { .. } => {
                JobFailure::transport(self.to_string())
            }
            Self::NotFound | Self::Api { .. } => JobFailure::backend(self.to_string()),
            Self::Normalization(e) => e.into(),
        }
    }
}

/// Ensure the response has a success status code.
///
/// Non-2xx answers are mapped onto [`ClientError`], keeping the provider's
/// own error message when the body carries one.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        404 => Err(ClientError::NotFound),
        code @ (502 | 503 | 504) => Err(ClientError::Unavailable { status: code }),
        code => {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            Err(ClientError::Api {
                status: code,
                message: api_message(&body),
            })
        }
    }
}

/// Read a successful response as JSON.
///
/// Invalid JSON is a normalization problem, not a transport one.
pub(crate) async fn read_json(
    response: reqwest::Response,
) -> Result<serde_json::Value, ClientError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| NormalizationError(format!("invalid JSON body: {e}")).into())
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| normalize::error_message(&v))
        .unwrap_or_else(|| body.chars().take(MAX_BODY_CHARS).collect())
}
