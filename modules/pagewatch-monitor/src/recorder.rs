use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use pagewatch_common::{AnalysisRecord, NewsItem, RatingResult};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::AnalysisStore;

/// Where a record ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteOutcome {
    Primary,
    Fallback { primary_error: String },
    BothFailed {
        primary_error: String,
        fallback_error: String,
    },
}

impl WriteOutcome {
    /// True unless the primary store took the write.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, WriteOutcome::Primary)
    }

    pub fn label(&self) -> &'static str {
        match self {
            WriteOutcome::Primary => "primary",
            WriteOutcome::Fallback { .. } => "fallback",
            WriteOutcome::BothFailed { .. } => "both_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub record: AnalysisRecord,
    pub outcome: WriteOutcome,
}

/// Everything known about one URL's analysis before it gets an id.
#[derive(Debug, Clone, Default)]
pub struct AnalysisDraft {
    pub rating: Option<RatingResult>,
    pub changes_detected: bool,
    /// Why the record has no rating, or why the content counted as changed.
    pub reason: Option<String>,
    pub explanation: Option<String>,
    pub similarity: Option<f64>,
    pub fetcher: Option<String>,
}

/// Writes one [`AnalysisRecord`] per call: primary store first, local log on
/// primary failure.
pub struct AnalysisRecorder {
    primary: Option<Arc<dyn AnalysisStore>>,
    fallback: Arc<dyn AnalysisStore>,
}

impl AnalysisRecorder {
    pub fn new(primary: Option<Arc<dyn AnalysisStore>>, fallback: Arc<dyn AnalysisStore>) -> Self {
        Self { primary, fallback }
    }

    pub async fn record(&self, run_id: Uuid, url: &str, site_name: &str, draft: AnalysisDraft) -> Recorded {
        let record = build_record(run_id, url, site_name, draft);
        let outcome = self.write(&record).await;

        match &outcome {
            WriteOutcome::Primary => info!(
                url,
                rating = record.overall_rating.map(|r| r.value()),
                changes = record.changes_detected,
                "Analysis recorded"
            ),
            WriteOutcome::Fallback { primary_error } => warn!(
                url,
                fallback = self.fallback.name(),
                primary_error = %primary_error,
                "Analysis recorded to local fallback"
            ),
            WriteOutcome::BothFailed {
                primary_error,
                fallback_error,
            } => error!(
                url,
                record_id = %record.id,
                primary_error = %primary_error,
                fallback_error = %fallback_error,
                "Analysis could not be persisted"
            ),
        }

        Recorded { record, outcome }
    }

    async fn write(&self, record: &AnalysisRecord) -> WriteOutcome {
        let primary_error = match &self.primary {
            Some(primary) => match primary.insert(record).await {
                Ok(()) => return WriteOutcome::Primary,
                Err(e) => e.to_string(),
            },
            None => "primary store not configured".to_string(),
        };

        match self.fallback.insert(record).await {
            Ok(()) => WriteOutcome::Fallback { primary_error },
            Err(e) => WriteOutcome::BothFailed {
                primary_error,
                fallback_error: e.to_string(),
            },
        }
    }

    /// Newest-first history, optionally for one URL. Both stores are read
    /// and merged by record id, so records written during a primary outage
    /// stay visible after it recovers.
    pub async fn history(&self, url: Option<&str>, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let read = move |store: Arc<dyn AnalysisStore>| async move {
            match url {
                Some(url) => store.for_url(url, limit).await,
                None => store.recent(limit).await,
            }
        };

        let primary = match &self.primary {
            Some(primary) => Some(read(primary.clone()).await),
            None => None,
        };
        let local = read(self.fallback.clone()).await;

        let mut records = self.merge(primary, local)?;
        records.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        records.truncate(limit);
        Ok(records)
    }

    /// Most recent record per URL ("last checked") across both stores.
    pub async fn latest(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let primary = match &self.primary {
            Some(primary) => Some(primary.latest_per_url().await),
            None => None,
        };
        let local = self.fallback.latest_per_url().await;

        let mut latest: HashMap<String, AnalysisRecord> = HashMap::new();
        for record in self.merge(primary, local)? {
            match latest.get(&record.url) {
                Some(existing) if existing.analyzed_at >= record.analyzed_at => {}
                _ => {
                    latest.insert(record.url.clone(), record);
                }
            }
        }
        let mut records: Vec<_> = latest.into_values().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(records)
    }

    /// Union of both reads, deduplicated by id. Fails only when every
    /// configured store failed.
    fn merge(
        &self,
        primary: Option<Result<Vec<AnalysisRecord>, StoreError>>,
        local: Result<Vec<AnalysisRecord>, StoreError>,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let (primary, local) = match (primary, local) {
            (None, local) => return local,
            (Some(Err(e)), local) => {
                warn!(error = %e, "Primary store unavailable, reading local log");
                return local;
            }
            (Some(Ok(primary)), Err(e)) => {
                warn!(fallback = self.fallback.name(), error = %e, "Local log unreadable, using primary only");
                return Ok(primary);
            }
            (Some(Ok(primary)), Ok(local)) => (primary, local),
        };

        let mut seen: HashSet<Uuid> = primary.iter().map(|r| r.id).collect();
        let mut records = primary;
        records.extend(local.into_iter().filter(|r| seen.insert(r.id)));
        Ok(records)
    }
}

fn build_record(run_id: Uuid, url: &str, site_name: &str, draft: AnalysisDraft) -> AnalysisRecord {
    // Unchanged content never carries a rating.
    let rating = draft.rating.filter(|_| draft.changes_detected);

    let (overall_rating, explanation, items) = match rating {
        Some(result) => (
            Some(result.score),
            Some(result.explanation),
            result.items.into_iter().map(NewsItem::from).collect(),
        ),
        None => (None, draft.explanation, Vec::new()),
    };

    AnalysisRecord {
        id: Uuid::new_v4(),
        run_id,
        url: url.to_string(),
        site_name: site_name.to_string(),
        overall_rating,
        explanation,
        changes_detected: draft.changes_detected,
        reason: draft.reason,
        similarity: draft.similarity,
        fetcher: draft.fetcher,
        analyzed_at: Utc::now(),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewatch_common::{RatedItem, Rating};

    fn rating(score: i64) -> RatingResult {
        RatingResult {
            score: Rating::new(score).unwrap(),
            explanation: "notable".into(),
            items: vec![RatedItem {
                title: "Ny skola".into(),
                date: Some("1 mars".into()),
                score: Rating::new(5).unwrap(),
                excerpt: Some("Bygget startar i vår.".into()),
            }],
        }
    }

    #[test]
    fn rated_record_carries_items() {
        let record = build_record(
            Uuid::new_v4(),
            "https://a.se",
            "A",
            AnalysisDraft {
                rating: Some(rating(4)),
                changes_detected: true,
                ..Default::default()
            },
        );
        assert_eq!(record.overall_rating.map(|r| r.value()), Some(4));
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].content, "Bygget startar i vår.");
        assert_eq!(record.peak_rating().map(|r| r.value()), Some(5));
    }

    #[test]
    fn unchanged_record_drops_any_rating() {
        let record = build_record(
            Uuid::new_v4(),
            "https://a.se",
            "A",
            AnalysisDraft {
                rating: Some(rating(5)),
                changes_detected: false,
                reason: Some("unchanged".into()),
                ..Default::default()
            },
        );
        assert!(record.overall_rating.is_none());
        assert!(record.items.is_empty());
        assert_eq!(record.reason.as_deref(), Some("unchanged"));
    }

    #[test]
    fn only_primary_writes_are_not_degraded() {
        assert!(!WriteOutcome::Primary.is_degraded());
        assert!(WriteOutcome::Fallback {
            primary_error: "down".into()
        }
        .is_degraded());
    }
}
