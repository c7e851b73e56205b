use thiserror::Error;

#[derive(Debug, Error)]
pub enum PagewatchError {
    #[error("Rating {0} is outside 1..=5")]
    RatingOutOfRange(i64),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("No active sites configured")]
    NoActiveSites,

    #[error("Validation error: {0}")]
    Validation(String),
}
