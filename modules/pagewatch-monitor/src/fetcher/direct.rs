use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pagewatch_common::RawContent;
use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};

use super::{check_url, truncate_chars, PageFetcher};
use crate::error::FetchError;
use crate::retry::RetryPolicy;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

/// Plain HTTP GET plus Readability text extraction. No item extraction.
pub struct DirectFetcher {
    http: reqwest::Client,
    retry: RetryPolicy,
    max_chars: usize,
}

impl DirectFetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        retry: RetryPolicy,
        max_chars: usize,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;
        info!("Using DirectFetcher (HTTP GET + Readability extraction)");
        Ok(Self {
            http,
            retry,
            max_chars,
        })
    }

    async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = resp.status().as_u16();
        match status {
            401 | 403 | 429 => {
                return Err(FetchError::Blocked {
                    url: url.to_string(),
                    status,
                })
            }
            s if !(200..300).contains(&s) => {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status,
                })
            }
            _ => {}
        }

        resp.text().await.map_err(|e| request_error(url, e))
    }
}

#[async_trait]
impl PageFetcher for DirectFetcher {
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
        let parsed = check_url(url)?;
        info!(url, fetcher = "direct", "Fetching URL");

        let html = self
            .retry
            .run("direct fetch", || self.get_html(url))
            .await
            .map_err(|e| e.error)?;

        let text = html_to_text(&parsed, &html);
        if text.trim().is_empty() {
            warn!(url, fetcher = "direct", bytes = html.len(), "Readability produced no text");
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        info!(url, fetcher = "direct", chars = text.len(), "Fetched");
        Ok(RawContent {
            url: url.to_string(),
            title: extract_title(&html),
            text: truncate_chars(text, self.max_chars),
            items: Vec::new(),
            fetcher: self.name().to_string(),
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "direct"
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

fn html_to_text(url: &url::Url, html: &str) -> String {
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: Some(url),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_extracted_and_collapsed() {
        let html = "<html><head><TITLE>\n  Nyheter -\n Kommunen </TITLE></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Nyheter - Kommunen"));
        assert_eq!(extract_title("<html></html>"), None);
    }

    #[test]
    fn blocked_and_server_errors_classify_differently() {
        use crate::retry::Retryable;
        let blocked = FetchError::Blocked {
            url: "https://a.se".into(),
            status: 403,
        };
        let server = FetchError::Http {
            url: "https://a.se".into(),
            status: 503,
        };
        assert!(!blocked.is_transient());
        assert!(server.is_transient());
    }
}
