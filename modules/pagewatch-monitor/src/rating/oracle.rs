use std::time::Duration;

use ai_client::{OpenAi, StructuredOutput};
use async_trait::async_trait;
use tracing::debug;

use super::prompt::RatingRequest;
use super::reply::OracleReply;
use crate::error::OracleError;

/// External service that turns a rating request into raw reply text.
#[async_trait]
pub trait RatingOracle: Send + Sync {
    async fn complete(&self, request: &RatingRequest) -> Result<String, OracleError>;
    fn name(&self) -> &str;
}

// --- Chat completions ---

/// Chat completions constrained to the reply's JSON schema.
pub struct ChatOracle {
    ai: OpenAi,
}

impl ChatOracle {
    pub fn new(ai: OpenAi) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl RatingOracle for ChatOracle {
    async fn complete(&self, request: &RatingRequest) -> Result<String, OracleError> {
        debug!(model = self.ai.model(), "Requesting chat rating");
        let text = self
            .ai
            .structured_output(
                request.system.as_str(),
                request.user.as_str(),
                "page_rating",
                OracleReply::openai_schema(),
            )
            .await?;
        Ok(text)
    }

    fn name(&self) -> &str {
        "openai-chat"
    }
}

// --- Assistants API ---

/// A pre-configured OpenAI assistant. Its instructions live server-side,
/// so only the user message is sent.
pub struct AssistantOracle {
    ai: OpenAi,
    assistant_id: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl AssistantOracle {
    pub fn new(ai: OpenAi, assistant_id: impl Into<String>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            ai,
            assistant_id: assistant_id.into(),
            poll_interval,
            timeout,
        }
    }
}

#[async_trait]
impl RatingOracle for AssistantOracle {
    async fn complete(&self, request: &RatingRequest) -> Result<String, OracleError> {
        let reply = self
            .ai
            .run_assistant(&self.assistant_id, &request.user, self.poll_interval, self.timeout)
            .await?;
        debug!(thread_id = %reply.thread_id, run_id = %reply.run_id, chars = reply.text.len(), "Assistant replied");
        Ok(reply.text)
    }

    fn name(&self) -> &str {
        "openai-assistant"
    }
}
