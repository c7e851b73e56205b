use std::path::PathBuf;

use async_trait::async_trait;
use pagewatch_common::{AnalysisRecord, Rating};
use tracing::info;

use super::backend::NotifyBackend;
use crate::summary::RunSummary;

/// Writes a markdown digest per run into a directory.
pub struct FileDigest {
    dir: PathBuf,
    min_rating: Rating,
}

impl FileDigest {
    pub fn new(dir: impl Into<PathBuf>, min_rating: Rating) -> Self {
        Self {
            dir: dir.into(),
            min_rating,
        }
    }
}

#[async_trait]
impl NotifyBackend for FileDigest {
    async fn notify(&self, _record: &AnalysisRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_digest(&self, summary: &RunSummary) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!(
            "digest-{}.md",
            summary.finished_at.format("%Y%m%d-%H%M%S")
        ));
        tokio::fs::write(&path, digest_markdown(summary, self.min_rating)).await?;
        info!(path = %path.display(), "Digest written");
        Ok(())
    }
}

pub(crate) fn digest_markdown(summary: &RunSummary, min_rating: Rating) -> String {
    let mut md = format!(
        "# Pagewatch digest {}\n\n",
        summary.finished_at.format("%Y-%m-%d %H:%M UTC")
    );

    md.push_str(&format!("## Rated {min_rating} or higher\n\n"));
    let highlights = summary.highlights(min_rating);
    if highlights.is_empty() {
        md.push_str("No high-interest updates.\n");
    }
    for record in highlights {
        md.push_str(&format!("### [{}]({})", record.site_name, record.url));
        if let Some(r) = record.overall_rating {
            md.push_str(&format!(" {r}"));
        }
        md.push('\n');
        if let Some(explanation) = &record.explanation {
            md.push_str(&format!("\n{explanation}\n"));
        }
        for item in &record.items {
            md.push_str(&format!(
                "- **{}** ({}) {}\n",
                item.title,
                item.date.as_deref().unwrap_or("no date"),
                item.rating
            ));
        }
        md.push('\n');
    }

    md.push_str("\n## All sites\n\n");
    for result in &summary.results {
        let status = match result.record() {
            Some(record) => match record.overall_rating {
                Some(r) => format!("rated {r}"),
                None => record.reason.clone().unwrap_or_else(|| "recorded".into()),
            },
            None => format!("failed: {}", result.reason().unwrap_or("unknown")),
        };
        md.push_str(&format!("- {} ({}): {status}\n", result.site_name, result.url));
    }
    md
}
