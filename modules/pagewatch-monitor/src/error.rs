//! Typed errors for the monitoring pipeline.

use std::path::PathBuf;

use ai_client::AiError;
use thiserror::Error;

/// Why a page could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    /// 401/403/429 from the site itself, or an anti-bot page.
    #[error("blocked fetching {url} (status {status})")]
    Blocked { url: String, status: u16 },

    /// The scraping service is cooling down after rate limiting or repeated failures.
    #[error("{fetcher} unavailable for {remaining_secs}s more")]
    CoolingDown { fetcher: String, remaining_secs: u64 },

    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("could not parse content from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("no content at {url}")]
    Empty { url: String },

    #[error("{fallback} (primary fetcher: {primary})")]
    AllFailed {
        primary: Box<FetchError>,
        fallback: Box<FetchError>,
    },
}

impl FetchError {
    /// Short machine-readable reason recorded in run summaries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid-url",
            FetchError::Network { .. } | FetchError::Timeout { .. } => "network",
            FetchError::Blocked { .. } => "blocked",
            FetchError::CoolingDown { .. } => "rate-limited",
            FetchError::Http { .. } => "http-error",
            FetchError::Parse { .. } | FetchError::Empty { .. } => "parse-error",
            FetchError::AllFailed { fallback, .. } => fallback.reason_code(),
        }
    }
}

/// Failure talking to a rating oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("{message}")]
    Other { message: String, transient: bool },
}

impl OracleError {
    /// The oracle answered, but not with anything usable.
    pub fn is_bad_reply(&self) -> bool {
        matches!(self, OracleError::Ai(AiError::Parse(_) | AiError::Empty(_)))
    }
}

/// Why a page ended up without a rating. Each kind maps to a stable reason code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RatingFailure {
    #[error("rating unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("rating request rejected: {0}")]
    Rejected(String),

    #[error("rating reply invalid: {0}")]
    Invalid(String),

    #[error("no rating oracle configured")]
    Unconfigured,
}

impl RatingFailure {
    pub fn reason_code(&self) -> &'static str {
        match self {
            RatingFailure::Unavailable { .. } => "rating-unavailable",
            RatingFailure::Rejected(_) => "rating-rejected",
            RatingFailure::Invalid(_) => "rating-invalid",
            RatingFailure::Unconfigured => "rating-unconfigured",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("site already exists: {0}")]
    Duplicate(String),

    #[error("site not found: {0}")]
    NotFound(String),

    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Run-level failures. Everything else is caught per URL.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no active sites configured")]
    NoActiveSites,

    #[error("could not load the site list: {0}")]
    Sites(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        let blocked = FetchError::Blocked {
            url: "https://a.se".into(),
            status: 403,
        };
        assert_eq!(blocked.reason_code(), "blocked");
        assert_eq!(
            RatingFailure::Unavailable {
                attempts: 3,
                last_error: "timeout".into()
            }
            .reason_code(),
            "rating-unavailable"
        );
        assert_eq!(RatingFailure::Invalid("x".into()).reason_code(), "rating-invalid");
    }

    #[test]
    fn combined_failure_reports_fallback_reason() {
        let err = FetchError::AllFailed {
            primary: Box::new(FetchError::CoolingDown {
                fetcher: "firecrawl".into(),
                remaining_secs: 120,
            }),
            fallback: Box::new(FetchError::Timeout {
                url: "https://a.se".into(),
            }),
        };
        assert_eq!(err.reason_code(), "network");
        assert!(err.to_string().contains("firecrawl"));
    }

    #[test]
    fn parse_and_empty_replies_are_bad_replies() {
        assert!(OracleError::Ai(AiError::Parse("x".into())).is_bad_reply());
        assert!(!OracleError::Ai(AiError::Timeout).is_bad_reply());
    }
}
