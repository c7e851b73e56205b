use thiserror::Error;

pub type Result<T> = std::result::Result<T, FirecrawlError>;

#[derive(Debug, Error)]
pub enum FirecrawlError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by Firecrawl (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Extract job {job_id} {status}")]
    JobFailed { job_id: String, status: String },
}

impl FirecrawlError {
    pub fn is_transient(&self) -> bool {
        match self {
            FirecrawlError::Network(_) | FirecrawlError::Timeout => true,
            FirecrawlError::Api { status, .. } => *status >= 500 || *status == 408,
            // Rate limits are handled by the caller's cool-down, not by hammering
            FirecrawlError::RateLimited { .. } => false,
            FirecrawlError::Parse(_) | FirecrawlError::JobFailed { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FirecrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FirecrawlError::Timeout
        } else if err.is_decode() {
            FirecrawlError::Parse(err.to_string())
        } else {
            FirecrawlError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FirecrawlError {
    fn from(err: serde_json::Error) -> Self {
        FirecrawlError::Parse(err.to_string())
    }
}
