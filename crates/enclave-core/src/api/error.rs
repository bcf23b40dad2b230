use reqwest::{Response, StatusCode};
use thiserror::Error;

use super::wire::MessageBody;

/// Failure of a single HTTP exchange.
///
/// Never leaves the API client: every public operation folds it into a
/// failure-shaped result envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Host unreachable, connection reset, timeout.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx answer.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Body was not the JSON we expected.
    #[error("Invalid response from {service}")]
    Parse { service: &'static str },

    /// Well-formed answer that lacks the artifact we asked for.
    #[error("{0}")]
    Rejected(String),
}

/// Pass 2xx responses through; turn anything else into [`ApiError::Status`],
/// preferring the server's own `message` over the bare status line.
pub(crate) async fn error_for_status(response: Response, prefix: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<MessageBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| status_line(status));

    Err(ApiError::Status {
        status,
        message: format!("{}: {}", prefix, detail),
    })
}

pub(crate) fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
