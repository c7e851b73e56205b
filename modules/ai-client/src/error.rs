use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by OpenAI (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response: {0}")]
    Empty(String),

    #[error("Assistant run {run_id} ended with status {status}: {message}")]
    RunFailed {
        run_id: String,
        status: String,
        message: String,
        transient: bool,
    },
}

impl AiError {
    /// Classify a non-success HTTP response.
    pub(crate) fn from_response(status: StatusCode, headers: &HeaderMap, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => AiError::Auth {
                status: status.as_u16(),
                message: body,
            },
            // insufficient_quota comes back as 429 but waiting does not help
            429 if body.contains("insufficient_quota") => AiError::Api {
                status: 429,
                message: body,
            },
            429 => AiError::RateLimited {
                retry_after_secs: headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok()),
            },
            code => AiError::Api {
                status: code,
                message: body,
            },
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Network(_) | AiError::Timeout | AiError::RateLimited { .. } => true,
            AiError::Api { status, .. } => *status >= 500 || *status == 408,
            AiError::RunFailed { transient, .. } => *transient,
            AiError::Auth { .. } | AiError::Parse(_) | AiError::Empty(_) => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout
        } else if err.is_decode() {
            AiError::Parse(err.to_string())
        } else {
            AiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        AiError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn unauthorized_is_permanent() {
        let err = AiError::from_response(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "bad key".into());
        assert!(matches!(err, AiError::Auth { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = AiError::from_response(StatusCode::TOO_MANY_REQUESTS, &headers, String::new());
        assert!(matches!(
            err,
            AiError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn exhausted_quota_is_not_retried() {
        let body = r#"{"error":{"code":"insufficient_quota"}}"#.to_string();
        let err = AiError::from_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), body);
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = AiError::from_response(StatusCode::BAD_GATEWAY, &HeaderMap::new(), String::new());
        let client = AiError::from_response(StatusCode::BAD_REQUEST, &HeaderMap::new(), String::new());
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }
}
