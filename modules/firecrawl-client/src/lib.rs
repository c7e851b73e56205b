pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{DocumentMetadata, ScrapedDocument};

use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use types::{ApiResponse, ExtractInput, ExtractStarted, ExtractStatus, ScrapeInput};

const BASE_URL: &str = "https://api.firecrawl.dev/v1";

/// Extract jobs are polled with a doubling interval, capped here.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct FirecrawlClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl FirecrawlClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FirecrawlError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            api_key: api_key.trim().to_string(),
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(FirecrawlError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }

    /// Render a page and return its markdown and html.
    pub async fn scrape(&self, url: &str) -> Result<ScrapedDocument> {
        let endpoint = format!("{}/scrape", self.base_url);
        let body = ScrapeInput {
            url,
            formats: &["markdown", "html"],
            only_main_content: true,
            timeout: self.timeout.as_millis() as u64,
        };

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let api: ApiResponse<ScrapedDocument> = Self::decode(resp).await?;
        if !api.success {
            return Err(FirecrawlError::Api {
                status: 200,
                message: api.error.unwrap_or_else(|| "scrape reported failure".into()),
            });
        }
        api.data
            .ok_or_else(|| FirecrawlError::Parse("scrape response has no data".into()))
    }

    /// Run schema-driven extraction for one URL. Waits for async jobs up to
    /// `max_wait`, polling every `poll_interval` (doubling each time).
    pub async fn extract(
        &self,
        url: &str,
        prompt: &str,
        schema: &serde_json::Value,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<serde_json::Value> {
        let endpoint = format!("{}/extract", self.base_url);
        let body = ExtractInput {
            urls: vec![url],
            prompt,
            schema,
        };

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let started: ExtractStarted = Self::decode(resp).await?;
        if !started.success {
            return Err(FirecrawlError::Api {
                status: 200,
                message: started.error.unwrap_or_else(|| "extract reported failure".into()),
            });
        }

        match (started.data, started.id) {
            (Some(data), _) => Ok(data),
            (None, Some(job_id)) => {
                info!(url, job_id = %job_id, "Extract job started, polling for completion");
                self.wait_for_extract(&job_id, poll_interval, max_wait).await
            }
            (None, None) => Err(FirecrawlError::Parse(
                "extract response has neither data nor job id".into(),
            )),
        }
    }

    async fn wait_for_extract(
        &self,
        job_id: &str,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<serde_json::Value> {
        let endpoint = format!("{}/extract/{}", self.base_url, job_id);
        let started = Instant::now();
        let mut interval = poll_interval;

        loop {
            if started.elapsed() >= max_wait {
                return Err(FirecrawlError::Timeout);
            }
            tokio::time::sleep(interval.min(MAX_POLL_INTERVAL)).await;
            interval = interval.saturating_mul(2);

            let resp = self
                .client
                .get(&endpoint)
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            let status: ExtractStatus = Self::decode(resp).await?;

            match status.status.as_str() {
                "completed" => {
                    return status.data.ok_or_else(|| {
                        FirecrawlError::Parse(format!("extract job {job_id} completed without data"))
                    })
                }
                "failed" | "cancelled" => {
                    return Err(FirecrawlError::JobFailed {
                        job_id: job_id.to_string(),
                        status: status.status,
                    })
                }
                other => debug!(job_id, status = other, "Extract job still in progress"),
            }
        }
    }
}
