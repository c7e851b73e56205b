//! Rating dispatch: prompt building, oracle calls with retry, and strict
//! reply validation.

mod oracle;
mod prompt;
mod reply;

pub use oracle::{AssistantOracle, ChatOracle, RatingOracle};
pub use prompt::{PromptBuilder, RatingInput, RatingRequest};
pub use reply::parse_reply;

use std::sync::Arc;

use ai_client::AiError;
use pagewatch_common::RatingResult;
use tracing::{info, warn};

use crate::error::{OracleError, RatingFailure};
use crate::retry::{RetryError, RetryPolicy, Retryable};

/// Turns changed content into a validated [`RatingResult`].
pub struct RatingDispatcher {
    oracle: Option<Arc<dyn RatingOracle>>,
    retry: RetryPolicy,
    prompt: PromptBuilder,
}

impl RatingDispatcher {
    pub fn new(oracle: Option<Arc<dyn RatingOracle>>, retry: RetryPolicy, prompt: PromptBuilder) -> Self {
        Self { oracle, retry, prompt }
    }

    pub fn oracle_name(&self) -> Option<&str> {
        self.oracle.as_deref().map(|o| o.name())
    }

    pub async fn rate(&self, input: &RatingInput<'_>) -> Result<RatingResult, RatingFailure> {
        let Some(oracle) = &self.oracle else {
            return Err(RatingFailure::Unconfigured);
        };

        let request = self.prompt.build(input);
        let text = self
            .retry
            .run(oracle.name(), || oracle.complete(&request))
            .await
            .map_err(classify)?;

        let result = parse_reply(&text).inspect_err(|e| {
            warn!(url = input.url, oracle = oracle.name(), error = %e, "Oracle reply rejected");
        })?;

        info!(
            url = input.url,
            oracle = oracle.name(),
            score = result.score.value(),
            items = result.items.len(),
            "Content rated"
        );
        Ok(result)
    }
}

fn classify(failed: RetryError<OracleError>) -> RatingFailure {
    let RetryError { error, attempts } = failed;
    if error.is_bad_reply() {
        RatingFailure::Invalid(error.to_string())
    } else if error.is_transient() || matches!(error, OracleError::Ai(AiError::RateLimited { .. })) {
        RatingFailure::Unavailable {
            attempts,
            last_error: error.to_string(),
        }
    } else {
        RatingFailure::Rejected(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<String, OracleError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, OracleError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl RatingOracle for Scripted {
        async fn complete(&self, _request: &RatingRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(OracleError::Ai(AiError::Timeout)))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn dispatcher(oracle: Arc<Scripted>) -> RatingDispatcher {
        RatingDispatcher::new(
            Some(oracle),
            RetryPolicy::immediate(3),
            PromptBuilder::new("Local news", 1000, 5),
        )
    }

    fn input() -> RatingInput<'static> {
        RatingInput {
            url: "https://example.se",
            site_name: "Example",
            content: "Hello",
            diff_summary: "",
            items: &[],
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let oracle = Scripted::new(vec![
            Err(OracleError::Ai(AiError::Timeout)),
            Ok(r#"{"score": 4, "explanation": "notable"}"#.into()),
        ]);
        let result = dispatcher(oracle.clone()).rate(&input()).await.unwrap();
        assert_eq!(result.score.value(), 4);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_are_unavailable() {
        let oracle = Scripted::new(vec![]);
        let err = dispatcher(oracle.clone()).rate(&input()).await.unwrap_err();
        assert_eq!(
            err,
            RatingFailure::Unavailable {
                attempts: 3,
                last_error: "Request timed out".into()
            }
        );
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_failures_are_rejected_without_retry() {
        let oracle = Scripted::new(vec![Err(OracleError::Ai(AiError::Auth {
            status: 401,
            message: "invalid key".into(),
        }))]);
        let err = dispatcher(oracle.clone()).rate(&input()).await.unwrap_err();
        assert_eq!(err.reason_code(), "rating-rejected");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_reply_is_invalid() {
        let oracle = Scripted::new(vec![Ok(r#"{"score": 7, "explanation": "wow"}"#.into())]);
        let err = dispatcher(oracle).rate(&input()).await.unwrap_err();
        assert_eq!(err.reason_code(), "rating-invalid");
    }

    #[tokio::test]
    async fn empty_reply_is_invalid_not_retried() {
        let oracle = Scripted::new(vec![Err(OracleError::Ai(AiError::Empty("no content".into())))]);
        let err = dispatcher(oracle.clone()).rate(&input()).await.unwrap_err();
        assert_eq!(err.reason_code(), "rating-invalid");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_oracle_is_unconfigured() {
        let dispatcher = RatingDispatcher::new(None, RetryPolicy::immediate(1), PromptBuilder::new("x", 10, 1));
        assert_eq!(dispatcher.rate(&input()).await.unwrap_err(), RatingFailure::Unconfigured);
    }
}
