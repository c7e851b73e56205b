use async_trait::async_trait;
use pagewatch_common::RawContent;
use tracing::warn;

use super::{check_url, PageFetcher};
use crate::error::FetchError;

/// Tries the primary fetcher, then the fallback on any primary error.
/// With no primary configured every fetch goes straight to the fallback.
pub struct FallbackFetcher {
    primary: Option<Box<dyn PageFetcher>>,
    fallback: Box<dyn PageFetcher>,
}

impl FallbackFetcher {
    pub fn new(primary: Option<Box<dyn PageFetcher>>, fallback: Box<dyn PageFetcher>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PageFetcher for FallbackFetcher {
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
        check_url(url)?;

        let Some(primary) = &self.primary else {
            return self.fallback.fetch(url).await;
        };

        let primary_err = match primary.fetch(url).await {
            Ok(content) => return Ok(content),
            Err(e) => e,
        };

        warn!(
            url,
            primary = primary.name(),
            fallback = self.fallback.name(),
            error = %primary_err,
            "Primary fetch failed, falling back"
        );

        self.fallback
            .fetch(url)
            .await
            .map_err(|fallback_err| FetchError::AllFailed {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            })
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
