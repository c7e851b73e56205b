use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::*;
use crate::error::{AiError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;
        Ok(Self {
            api_key: api_key.trim().to_string(),
            http,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self, assistants: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| AiError::Auth {
                    status: 0,
                    message: format!("API key is not a valid header value: {e}"),
                })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if assistants {
            headers.insert("openai-beta", HeaderValue::from_static("assistants=v2"));
        }
        Ok(headers)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::from_response(status, &headers, body));
        }
        Ok(response.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        assistants: bool,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .headers(self.headers(assistants)?)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .headers(self.headers(true)?)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<String> {
        debug!(model = %request.model, structured = request.response_format.is_some(), "OpenAI chat request");

        let response: ChatResponse = self.post("/chat/completions", request, false).await?;
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AiError::Empty("no choices in chat response".into()))?;

        if let Some(refusal) = message.refusal {
            return Err(AiError::Api {
                status: 200,
                message: format!("model refused: {refusal}"),
            });
        }

        message
            .content
            .ok_or_else(|| AiError::Empty("chat response has no content".into()))
    }

    pub async fn create_thread(&self) -> Result<Thread> {
        self.post("/threads", &serde_json::json!({}), true).await
    }

    pub async fn add_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let body = CreateMessage {
            role: "user",
            content,
        };
        let _: serde_json::Value = self
            .post(&format!("/threads/{thread_id}/messages"), &body, true)
            .await?;
        Ok(())
    }

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = CreateRun { assistant_id };
        self.post(&format!("/threads/{thread_id}/runs"), &body, true)
            .await
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.get(&format!("/threads/{thread_id}/runs/{run_id}")).await
    }

    pub async fn latest_messages(&self, thread_id: &str) -> Result<MessageList> {
        self.get(&format!("/threads/{thread_id}/messages?order=desc&limit=10"))
            .await
    }
}
