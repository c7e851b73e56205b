use async_trait::async_trait;
use pagewatch_common::{AnalysisRecord, Rating};
use serde_json::json;
use tracing::{info, warn};

use super::backend::NotifyBackend;
use crate::summary::RunSummary;

const RESEND_URL: &str = "https://api.resend.com/emails";

/// Email digest through the Resend API. Individual records are not mailed.
pub struct ResendEmail {
    api_key: String,
    from: String,
    to: Vec<String>,
    min_rating: Rating,
    http: reqwest::Client,
}

impl ResendEmail {
    pub fn new(api_key: String, from: String, to: Vec<String>, min_rating: Rating) -> Self {
        Self {
            api_key,
            from,
            to,
            min_rating,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotifyBackend for ResendEmail {
    async fn notify(&self, _record: &AnalysisRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_digest(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let highlights = summary.highlights(self.min_rating);
        if highlights.is_empty() {
            return Ok(());
        }

        let subject = format!(
            "Pagewatch: {} interesting update(s) ({})",
            highlights.len(),
            summary.finished_at.format("%Y-%m-%d")
        );
        let payload = json!({
            "from": self.from,
            "to": self.to,
            "subject": subject,
            "html": digest_html(summary, &highlights, self.min_rating),
        });

        let resp = self
            .http
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Resend returned non-success");
            anyhow::bail!("Resend returned {status}");
        }

        info!(recipients = self.to.len(), highlights = highlights.len(), "Digest email sent");
        Ok(())
    }
}

fn digest_html(summary: &RunSummary, highlights: &[&AnalysisRecord], min_rating: Rating) -> String {
    let mut html = format!(
        "<h1>Pagewatch digest</h1>\n<p>{}</p>\n<h2>Rated {} or higher</h2>\n",
        summary.finished_at.format("%A %d %B %Y"),
        min_rating
    );

    for record in highlights {
        html.push_str(&format!(
            "<div><h3><a href=\"{}\">{}</a> {}</h3>\n",
            escape(&record.url),
            escape(&record.site_name),
            record.overall_rating.map(|r| r.to_string()).unwrap_or_default()
        ));
        if let Some(explanation) = &record.explanation {
            html.push_str(&format!("<p>{}</p>\n", escape(explanation)));
        }
        let items: Vec<_> = record.items.iter().filter(|i| i.rating >= min_rating).collect();
        if !items.is_empty() {
            html.push_str("<ul>\n");
            for item in items {
                html.push_str(&format!(
                    "<li><strong>{}</strong> {} {}</li>\n",
                    escape(&item.title),
                    item.date.as_deref().map(escape).unwrap_or_default(),
                    item.rating
                ));
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</div>\n");
    }

    html.push_str(&format!(
        "<p><small>{} analyzed, {} changed, {} failed</small></p>\n",
        summary.analyzed(),
        summary.changed(),
        summary.errored()
    ));
    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
