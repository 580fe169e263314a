//! HTTP plumbing shared by the provider adapters.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::llm::error::LLMError;
use crate::messages::MessageRole;

/// Retry delay assumed when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Sends a request, mapping transport failures and non-success statuses.
pub(crate) async fn send(request: RequestBuilder, timeout: Duration) -> Result<Response, LLMError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| LLMError::from_transport(&e, timeout))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, retry_after.as_deref(), &body))
}

/// Error body shapes seen in the wild.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { error: ErrorDetail },
    Plain { error: String },
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// Maps a non-success response to an error.
pub(crate) fn status_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> LLMError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
        return LLMError::rate_limited(retry_after);
    }

    let (message, error_type) = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Detailed { error }) => (error.message, error.error_type),
        Ok(ErrorBody::Plain { error }) => (error, None),
        Err(_) if body.trim().is_empty() => (
            status.canonical_reason().unwrap_or("unknown error").to_string(),
            None,
        ),
        Err(_) => (body.trim().to_string(), None),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::authentication_failed(message),
        StatusCode::BAD_REQUEST => LLMError::invalid_request(message),
        _ => LLMError::api_error(status.as_u16(), message, error_type),
    }
}

/// Returns the wire role for a message.
///
/// Execution results travel as user turns. A `tool` message needs a matching
/// tool-call id, which these conversations never carry.
pub(crate) fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Tool => MessageRole::User.as_str(),
        other => other.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::LLMErrorKind;

    #[test]
    fn rate_limit_reads_retry_after() {
        let error = status_error(StatusCode::TOO_MANY_REQUESTS, Some("12"), "");
        assert_eq!(error.retry_after(), Some(Duration::from_secs(12)));

        let error = status_error(StatusCode::TOO_MANY_REQUESTS, Some("soon"), "");
        assert_eq!(error.retry_after(), Some(DEFAULT_RETRY_AFTER));
    }

    #[test]
    fn unauthorized_is_authentication_failure() {
        let body = r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error"}}"#;
        let error = status_error(StatusCode::UNAUTHORIZED, None, body);
        assert!(matches!(
            error.kind,
            LLMErrorKind::AuthenticationFailed { ref reason } if reason == "Incorrect API key"
        ));
    }

    #[test]
    fn plain_error_body() {
        let error = status_error(StatusCode::NOT_FOUND, None, r#"{"error":"model 'x' not found"}"#);
        assert_eq!(
            error.kind,
            LLMErrorKind::ApiError {
                status_code: 404,
                message: "model 'x' not found".to_string(),
                error_type: None,
            }
        );
    }

    #[test]
    fn bad_request_is_invalid_request() {
        let error = status_error(StatusCode::BAD_REQUEST, None, "context too long");
        assert!(matches!(error.kind, LLMErrorKind::InvalidRequest { .. }));
    }

    #[test]
    fn empty_body_uses_reason_phrase() {
        let error = status_error(StatusCode::BAD_GATEWAY, None, "");
        assert!(error.to_string().contains("Bad Gateway"));
        assert!(error.is_retriable());
    }

    #[test]
    fn tool_role_travels_as_user() {
        assert_eq!(wire_role(MessageRole::Tool), "user");
        assert_eq!(wire_role(MessageRole::System), "system");
        assert_eq!(wire_role(MessageRole::Assistant), "assistant");
    }
}
