use async_trait::async_trait;
use pagewatch_common::{AnalysisRecord, Rating};
use serde_json::json;
use tracing::warn;

use super::backend::NotifyBackend;
use crate::summary::RunSummary;

/// Slack incoming webhook notification backend.
pub struct SlackWebhook {
    webhook_url: String,
    min_rating: Rating,
    http: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(webhook_url: String, min_rating: Rating) -> Self {
        Self {
            webhook_url,
            min_rating,
            http: reqwest::Client::new(),
        }
    }

    fn rating_emoji(rating: Option<Rating>) -> &'static str {
        match rating.map(Rating::value) {
            Some(5) => ":rotating_light:",
            Some(4) => ":newspaper:",
            _ => ":information_source:",
        }
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned non-success");
            anyhow::bail!("Slack webhook returned {status}");
        }

        Ok(())
    }
}

pub(super) fn record_text(record: &AnalysisRecord) -> String {
    let rating = record
        .overall_rating
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unrated".into());
    let mut text = format!(
        "{} *{}* ({})\n*Rating:* {}\n",
        SlackWebhook::rating_emoji(record.peak_rating()),
        record.site_name,
        record.url,
        rating,
    );
    if let Some(explanation) = &record.explanation {
        text.push_str(&format!("\n{explanation}\n"));
    }
    for item in &record.items {
        text.push_str(&format!(
            "  - {} [{}]{}\n",
            item.title,
            item.rating,
            item.date.as_deref().map(|d| format!(" _{d}_")).unwrap_or_default()
        ));
    }
    text
}

#[async_trait]
impl NotifyBackend for SlackWebhook {
    async fn notify(&self, record: &AnalysisRecord) -> anyhow::Result<()> {
        let payload = json!({
            "text": record_text(record),
            "unfurl_links": false,
        });

        self.post(payload).await
    }

    async fn send_digest(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let highlights = summary.highlights(self.min_rating);
        if highlights.is_empty() && summary.errored() == 0 && !summary.degraded() {
            // Nothing to report
            return Ok(());
        }

        let mut lines = vec![":mag: *Pagewatch Run Complete*".to_string()];
        lines.push(format!(
            "_Analyzed {} (changed={}, unchanged={}, failed={}, unrated={})_",
            summary.analyzed(),
            summary.changed(),
            summary.unchanged(),
            summary.errored(),
            summary.rating_failures(),
        ));

        if !highlights.is_empty() {
            lines.push(format!("*Rated {} or higher:*", self.min_rating));
            for record in highlights {
                let peak = record.peak_rating().map(|r| r.to_string()).unwrap_or_default();
                lines.push(format!("  - <{}|{}> {peak}", record.url, record.site_name));
            }
        }

        let failed: Vec<String> = summary
            .results
            .iter()
            .filter(|r| r.record().is_none())
            .map(|r| format!("  - {} ({})", r.site_name, r.reason().unwrap_or("unknown")))
            .collect();
        if !failed.is_empty() {
            lines.push("*Fetch failures:*".to_string());
            lines.extend(failed);
        }

        if summary.degraded() {
            lines.push(":warning: Primary store unavailable; results went to the local log.".to_string());
        }

        let payload = json!({
            "text": lines.join("\n"),
            "unfurl_links": false,
        });

        self.post(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pagewatch_common::NewsItem;
    use uuid::Uuid;

    #[test]
    fn record_text_lists_items() {
        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            url: "https://kommun.se/nyheter".into(),
            site_name: "Kommunen".into(),
            overall_rating: Some(Rating::new(4).unwrap()),
            explanation: Some("Ny skola planeras.".into()),
            changes_detected: true,
            reason: Some("changed".into()),
            similarity: Some(0.4),
            fetcher: Some("firecrawl".into()),
            analyzed_at: Utc::now(),
            items: vec![NewsItem {
                title: "Ny skola".into(),
                date: Some("1 mars".into()),
                rating: Rating::new(5).unwrap(),
                content: String::new(),
            }],
        };

        let text = record_text(&record);
        assert!(text.starts_with(":rotating_light: *Kommunen*"));
        assert!(text.contains("*Rating:* 4/5"));
        assert!(text.contains("  - Ny skola [5/5] _1 mars_"));
    }
}
