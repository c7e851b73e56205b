mod assistant;
mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use assistant::AssistantReply;
pub use schema::StructuredOutput;

use std::time::Duration;

use crate::error::Result;
use client::OpenAiClient;
use types::{ChatRequest, ResponseFormat, WireMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REPLY_TOKENS: u32 = 2048;

// =============================================================================
// OpenAi
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAi")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> Result<OpenAiClient> {
        let client = OpenAiClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Chat completion constrained to a strict JSON schema. Returns the raw
    /// JSON text so callers can apply their own validation.
    pub async fn structured_output(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .response_format(ResponseFormat::json_schema(schema_name, schema))
            .with_model_defaults(MAX_REPLY_TOKENS);

        self.client()?.chat(&request).await
    }

    /// Run a pre-configured assistant on a fresh thread and return its reply.
    pub async fn run_assistant(
        &self,
        assistant_id: &str,
        message: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<AssistantReply> {
        let client = self.client()?;
        assistant::run_to_completion(&client, assistant_id.trim(), message, poll_interval, timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gpt-4o-mini");
        assert_eq!(ai.model(), "gpt-4o-mini");
        assert_eq!(ai.timeout, DEFAULT_TIMEOUT);
        assert!(ai.base_url.is_none());
    }

    #[test]
    fn test_openai_with_base_url() {
        let ai = OpenAi::new("sk-test", "gpt-4o").with_base_url("https://proxy.internal/v1");
        assert_eq!(ai.base_url.as_deref(), Some("https://proxy.internal/v1"));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let ai = OpenAi::new("sk-very-secret", "gpt-4o");
        let printed = format!("{ai:?}");
        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("gpt-4o"));
    }
}
