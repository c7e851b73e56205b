use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use firecrawl_client::{FirecrawlClient, FirecrawlError};
use pagewatch_common::{ExtractedItem, RawContent};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{check_url, truncate_chars, PageFetcher};
use crate::error::FetchError;
use crate::retry::RetryPolicy;

/// Consecutive failures before the fetcher stops calling Firecrawl for a cool-down.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

const EXTRACT_PROMPT: &str = "Extract news items from this webpage. Each news item should have \
a title, date (if available), and the content of the news. Also extract general information \
about the site.";

const EXTRACT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const EXTRACT_MAX_WAIT: Duration = Duration::from_secs(120);

#[derive(Default)]
struct Breaker {
    open_until: Option<Instant>,
    consecutive_failures: u32,
}

/// Primary fetch path: Firecrawl item extraction plus a markdown scrape.
pub struct FirecrawlFetcher {
    client: FirecrawlClient,
    retry: RetryPolicy,
    extract_items: bool,
    cooldown: Duration,
    max_chars: usize,
    breaker: Mutex<Breaker>,
}

impl FirecrawlFetcher {
    pub fn new(
        client: FirecrawlClient,
        retry: RetryPolicy,
        extract_items: bool,
        cooldown: Duration,
        max_chars: usize,
    ) -> Self {
        info!(extract_items, cooldown_secs = cooldown.as_secs(), "Using FirecrawlFetcher");
        Self {
            client,
            retry,
            extract_items,
            cooldown,
            max_chars,
            breaker: Mutex::new(Breaker::default()),
        }
    }

    fn check_breaker(&self) -> Result<(), FetchError> {
        let mut breaker = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        match breaker.open_until {
            Some(until) if until > Instant::now() => Err(FetchError::CoolingDown {
                fetcher: self.name().to_string(),
                remaining_secs: until.saturating_duration_since(Instant::now()).as_secs(),
            }),
            Some(_) => {
                info!("Firecrawl cool-down elapsed, resuming");
                *breaker = Breaker::default();
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        breaker.consecutive_failures = 0;
    }

    fn record_failure(&self, error: &FirecrawlError) {
        let mut breaker = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        if let FirecrawlError::RateLimited { retry_after_secs } = error {
            let wait = retry_after_secs
                .map(Duration::from_secs)
                .unwrap_or(self.cooldown);
            warn!(cooldown_secs = wait.as_secs(), "Rate limited by Firecrawl, cooling down");
            breaker.open_until = Some(Instant::now() + wait);
            return;
        }

        breaker.consecutive_failures += 1;
        if breaker.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            warn!(
                failures = breaker.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Too many consecutive Firecrawl errors, cooling down"
            );
            breaker.open_until = Some(Instant::now() + self.cooldown);
            breaker.consecutive_failures = 0;
        }
    }

    async fn extract(&self, url: &str) -> Result<Value, FirecrawlError> {
        let schema = extract_schema();
        self.retry
            .run("firecrawl extract", || {
                self.client
                    .extract(url, EXTRACT_PROMPT, &schema, EXTRACT_POLL_INTERVAL, EXTRACT_MAX_WAIT)
            })
            .await
            .map_err(|e| e.error)
    }

    async fn fetch_inner(&self, url: &str) -> Result<RawContent, FirecrawlError> {
        let mut items = Vec::new();
        let mut general = GeneralInfo::default();

        if self.extract_items {
            match self.extract(url).await {
                Ok(value) => (items, general) = parse_extracted(&value),
                // A rate limit on extract will hit scrape as well
                Err(e @ FirecrawlError::RateLimited { .. }) => return Err(e),
                Err(e) => warn!(url, error = %e, "Firecrawl extract failed, continuing with scrape"),
            }
        }

        let scraped = self
            .retry
            .run("firecrawl scrape", || self.client.scrape(url))
            .await
            .map_err(|e| e.error);

        let (markdown, title) = match scraped {
            Ok(doc) => (doc.markdown.filter(|m| !m.trim().is_empty()), doc.metadata.title),
            Err(e) if !items.is_empty() => {
                warn!(url, error = %e, "Firecrawl scrape failed, using extracted items only");
                (None, None)
            }
            Err(e) => return Err(e),
        };

        let text = match markdown {
            Some(md) => md,
            None if !items.is_empty() => {
                info!(url, items = items.len(), "Synthesising content from extracted items");
                synthesize_markdown(url, &general, &items)
            }
            None => {
                return Err(FirecrawlError::Parse(format!(
                    "no markdown and no extracted items for {url}"
                )))
            }
        };

        Ok(RawContent {
            url: url.to_string(),
            title,
            text: truncate_chars(text, self.max_chars),
            items,
            fetcher: self.name().to_string(),
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl PageFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
        check_url(url)?;
        self.check_breaker()?;

        info!(url, fetcher = "firecrawl", "Fetching URL");
        match self.fetch_inner(url).await {
            Ok(content) => {
                self.record_success();
                info!(
                    url,
                    fetcher = "firecrawl",
                    chars = content.text.len(),
                    items = content.items.len(),
                    "Fetched"
                );
                Ok(content)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(map_error(url, self.name(), e, self.cooldown))
            }
        }
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}

fn map_error(url: &str, fetcher: &str, error: FirecrawlError, cooldown: Duration) -> FetchError {
    let url = url.to_string();
    match error {
        FirecrawlError::Network(message) => FetchError::Network { url, message },
        FirecrawlError::Timeout => FetchError::Timeout { url },
        FirecrawlError::RateLimited { retry_after_secs } => FetchError::CoolingDown {
            fetcher: fetcher.to_string(),
            remaining_secs: retry_after_secs.unwrap_or(cooldown.as_secs()),
        },
        FirecrawlError::Api { status: 403, .. } => FetchError::Blocked { url, status: 403 },
        FirecrawlError::Api { status, .. } => FetchError::Http { url, status },
        FirecrawlError::Parse(message) => FetchError::Parse { url, message },
        FirecrawlError::JobFailed { job_id, status } => FetchError::Parse {
            url,
            message: format!("extract job {job_id} {status}"),
        },
    }
}

fn extract_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "news_items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "date": {"type": "string"},
                        "title": {"type": "string"},
                        "content": {"type": "string"}
                    },
                    "required": ["title"]
                }
            },
            "general_information": {
                "type": "object",
                "properties": {
                    "body": {"type": "string"},
                    "description": {"type": "string"}
                }
            }
        }
    })
}

#[derive(Debug, Default, PartialEq)]
struct GeneralInfo {
    description: Option<String>,
    body: Option<String>,
}

/// Pull items out of an extract result. Firecrawl returns either an object
/// or a one-element list of objects.
fn parse_extracted(value: &Value) -> (Vec<ExtractedItem>, GeneralInfo) {
    let root = match value {
        Value::Array(list) => list.first().unwrap_or(&Value::Null),
        other => other,
    };

    let text = |v: &Value, key: &str| {
        v.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let items = root
        .get("news_items")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|item| {
                    Some(ExtractedItem {
                        title: text(item, "title")?,
                        date: text(item, "date"),
                        content: text(item, "content").unwrap_or_default(),
                        first_seen: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let general = root
        .get("general_information")
        .map(|g| GeneralInfo {
            description: text(g, "description"),
            body: text(g, "body"),
        })
        .unwrap_or_default();

    (items, general)
}

fn synthesize_markdown(url: &str, general: &GeneralInfo, items: &[ExtractedItem]) -> String {
    let mut out = format!("# {url}\n\n");
    for part in [&general.description, &general.body].into_iter().flatten() {
        out.push_str(part);
        out.push_str("\n\n");
    }
    out.push_str("## News\n\n");
    for item in items {
        out.push_str(&format!("### {}\n", item.title));
        if let Some(date) = &item.date {
            out.push_str(&format!("*{date}*\n"));
        }
        if !item.content.is_empty() {
            out.push('\n');
            out.push_str(&item.content);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
