use pagewatch_monitor::fetcher::{FallbackFetcher, PageFetcher};
use pagewatch_monitor::testing::{MockFailure, MockFetcher};

const URL: &str = "https://kommun.example.se/nyheter";

#[tokio::test]
async fn fallback_serves_when_primary_fails() {
    let fetcher = FallbackFetcher::new(
        Some(Box::new(MockFetcher::named("firecrawl").on_failure(URL, MockFailure::Blocked))),
        Box::new(MockFetcher::named("direct").on_page(URL, "Hej från kommunen")),
    );

    let raw = fetcher.fetch(URL).await.unwrap();
    assert_eq!(raw.fetcher, "direct");
    assert_eq!(raw.text, "Hej från kommunen");
}

#[tokio::test]
async fn primary_result_is_used_when_it_succeeds() {
    let fetcher = FallbackFetcher::new(
        Some(Box::new(MockFetcher::named("firecrawl").on_page(URL, "primary"))),
        Box::new(MockFetcher::named("direct").on_page(URL, "fallback")),
    );

    assert_eq!(fetcher.fetch(URL).await.unwrap().fetcher, "firecrawl");
}

#[tokio::test]
async fn both_failing_reports_the_fallback_reason() {
    let fetcher = FallbackFetcher::new(
        Some(Box::new(MockFetcher::named("firecrawl").on_failure(URL, MockFailure::Network))),
        Box::new(MockFetcher::named("direct").on_failure(URL, MockFailure::Empty)),
    );

    let err = fetcher.fetch(URL).await.unwrap_err();
    assert_eq!(err.reason_code(), "parse-error");
}

#[tokio::test]
async fn invalid_urls_never_reach_a_fetcher() {
    let fetcher = FallbackFetcher::new(None, Box::new(MockFetcher::named("direct")));
    let err = fetcher.fetch("ftp://example.se/file").await.unwrap_err();
    assert_eq!(err.reason_code(), "invalid-url");
}
