mod direct;
mod fallback;
mod firecrawl;

pub use direct::DirectFetcher;
pub use fallback::FallbackFetcher;
pub use firecrawl::FirecrawlFetcher;

use async_trait::async_trait;
use pagewatch_common::RawContent;

use crate::error::FetchError;

// --- PageFetcher trait ---

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Retrieve current content for `url`. Never touches the snapshot store.
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError>;
    fn name(&self) -> &str;
}

/// Only absolute http(s) URLs are fetched.
pub(crate) fn check_url(url: &str) -> Result<url::Url, FetchError> {
    let parsed = url::Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("only http/https URLs are allowed, got {}", parsed.scheme()),
        });
    }
    Ok(parsed)
}

/// Cut `text` to at most `max_chars` characters.
pub(crate) fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_url_rejects_other_schemes() {
        assert!(check_url("https://example.se/nyheter").is_ok());
        assert!(matches!(
            check_url("javascript:alert(1)"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(check_url("ftp://x.se"), Err(FetchError::InvalidUrl { .. })));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("åäö och mer".into(), 3), "åäö");
        assert_eq!(truncate_chars("kort".into(), 100), "kort");
    }
}
