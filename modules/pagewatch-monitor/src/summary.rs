//! Per-URL outcomes and the run-level aggregate.

use chrono::{DateTime, Utc};
use pagewatch_common::{AnalysisRecord, Rating};
use serde::Serialize;
use uuid::Uuid;

use crate::recorder::WriteOutcome;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UrlStatus {
    Recorded {
        record: AnalysisRecord,
        write: WriteOutcome,
    },
    /// Nothing was fetched, so nothing was compared or recorded.
    FetchFailed { reason: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlResult {
    pub url: String,
    pub site_name: String,
    #[serde(flatten)]
    pub status: UrlStatus,
}

impl UrlResult {
    pub fn record(&self) -> Option<&AnalysisRecord> {
        match &self.status {
            UrlStatus::Recorded { record, .. } => Some(record),
            UrlStatus::FetchFailed { .. } => None,
        }
    }

    /// Reason code for the summary line.
    pub fn reason(&self) -> Option<&str> {
        match &self.status {
            UrlStatus::Recorded { record, .. } => record.reason.as_deref(),
            UrlStatus::FetchFailed { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<UrlResult>,
}

impl RunSummary {
    fn records(&self) -> impl Iterator<Item = &AnalysisRecord> {
        self.results.iter().filter_map(UrlResult::record)
    }

    /// URLs that produced an analysis record.
    pub fn analyzed(&self) -> usize {
        self.records().count()
    }

    pub fn changed(&self) -> usize {
        self.records().filter(|r| r.changes_detected).count()
    }

    pub fn unchanged(&self) -> usize {
        self.records().filter(|r| !r.changes_detected).count()
    }

    pub fn errored(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, UrlStatus::FetchFailed { .. }))
            .count()
    }

    /// Changed pages that ended up without a rating.
    pub fn rating_failures(&self) -> usize {
        self.records()
            .filter(|r| r.changes_detected && r.overall_rating.is_none())
            .count()
    }

    pub fn highest_rating(&self) -> Option<Rating> {
        self.records().filter_map(AnalysisRecord::peak_rating).max()
    }

    /// Any record missed the primary store.
    pub fn degraded(&self) -> bool {
        self.results.iter().any(|r| match &r.status {
            UrlStatus::Recorded { write, .. } => write.is_degraded(),
            UrlStatus::FetchFailed { .. } => false,
        })
    }

    /// Records whose overall or item rating reaches `min`, highest first.
    pub fn highlights(&self, min: Rating) -> Vec<&AnalysisRecord> {
        let mut out: Vec<_> = self
            .records()
            .filter(|r| r.peak_rating().is_some_and(|p| p >= min))
            .collect();
        out.sort_by(|a, b| b.peak_rating().cmp(&a.peak_rating()));
        out
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Pagewatch Run Complete ===")?;
        writeln!(f, "Run:              {}", self.run_id)?;
        writeln!(
            f,
            "Duration:         {}s",
            (self.finished_at - self.started_at).num_seconds()
        )?;
        writeln!(f, "URLs analyzed:    {}", self.analyzed())?;
        writeln!(f, "URLs changed:     {}", self.changed())?;
        writeln!(f, "URLs unchanged:   {}", self.unchanged())?;
        writeln!(f, "URLs failed:      {}", self.errored())?;
        writeln!(f, "Rating failures:  {}", self.rating_failures())?;
        match self.highest_rating() {
            Some(r) => writeln!(f, "Highest rating:   {r}")?,
            None => writeln!(f, "Highest rating:   -")?,
        }
        if self.degraded() {
            writeln!(f, "Storage:          DEGRADED (local fallback in use)")?;
        }

        writeln!(f, "\nPer URL:")?;
        for result in &self.results {
            let detail = match &result.status {
                UrlStatus::Recorded { record, .. } => match record.overall_rating {
                    Some(r) => format!("rated {r}"),
                    None => record.reason.clone().unwrap_or_else(|| "recorded".into()),
                },
                UrlStatus::FetchFailed { reason, message } => format!("FAILED {reason}: {message}"),
            };
            writeln!(f, "  {:<40} {}", result.site_name, detail)?;
        }
        Ok(())
    }
}

/// Incremental progress for whoever is watching the run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunProgress {
    Started { run_id: Uuid, total: usize },
    UrlStarted { url: String, index: usize },
    UrlFinished { result: Box<UrlResult> },
    Finished { summary: Box<RunSummary> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewatch_common::NewsItem;

    fn recorded(url: &str, rating: Option<i64>, changed: bool, write: WriteOutcome) -> UrlResult {
        UrlResult {
            url: url.into(),
            site_name: url.into(),
            status: UrlStatus::Recorded {
                record: AnalysisRecord {
                    id: Uuid::new_v4(),
                    run_id: Uuid::nil(),
                    url: url.into(),
                    site_name: url.into(),
                    overall_rating: rating.map(|r| Rating::new(r).unwrap()),
                    explanation: None,
                    changes_detected: changed,
                    reason: None,
                    similarity: None,
                    fetcher: None,
                    analyzed_at: Utc::now(),
                    items: vec![],
                },
                write,
            },
        }
    }

    fn summary(results: Vec<UrlResult>) -> RunSummary {
        RunSummary {
            run_id: Uuid::nil(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results,
        }
    }

    #[test]
    fn counts_cover_every_outcome() {
        let s = summary(vec![
            recorded("a", Some(3), true, WriteOutcome::Primary),
            recorded("b", None, false, WriteOutcome::Primary),
            recorded("c", None, true, WriteOutcome::Primary),
            UrlResult {
                url: "d".into(),
                site_name: "d".into(),
                status: UrlStatus::FetchFailed {
                    reason: "network".into(),
                    message: "timeout".into(),
                },
            },
        ]);
        assert_eq!(s.analyzed(), 3);
        assert_eq!(s.changed(), 2);
        assert_eq!(s.unchanged(), 1);
        assert_eq!(s.errored(), 1);
        assert_eq!(s.rating_failures(), 1);
        assert_eq!(s.highest_rating().map(|r| r.value()), Some(3));
        assert!(!s.degraded());
        assert!(s.to_string().contains("FAILED network"));
    }

    #[test]
    fn highlights_count_item_ratings() {
        let mut with_item = recorded("a", Some(2), true, WriteOutcome::Primary);
        if let UrlStatus::Recorded { record, .. } = &mut with_item.status {
            record.items.push(NewsItem {
                title: "Stor nyhet".into(),
                date: None,
                rating: Rating::new(5).unwrap(),
                content: String::new(),
            });
        }
        let s = summary(vec![
            with_item,
            recorded("b", Some(3), true, WriteOutcome::Fallback {
                primary_error: "down".into(),
            }),
        ]);

        let top = s.highlights(Rating::new(4).unwrap());
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].url, "a");
        assert!(s.degraded());
    }
}
