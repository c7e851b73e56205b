//! The run loop: every active site goes through fetch, change detection,
//! rating and recording. Failures stay inside the URL that caused them.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use pagewatch_common::{ExtractedItem, MonitoredSite, Rating};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::detector::{ChangeDetector, Detection, Significance};
use crate::error::RunError;
use crate::fetcher::PageFetcher;
use crate::notify::NotifyBackend;
use crate::rating::{RatingDispatcher, RatingInput};
use crate::recorder::{AnalysisDraft, AnalysisRecorder};
use crate::run_log::{EventKind, RunLog};
use crate::sites::SiteRegistry;
use crate::snapshot::{next_snapshot, SnapshotStore};
use crate::summary::{RunProgress, RunSummary, UrlResult, UrlStatus};

/// Collaborators a [`Monitor`] is built from.
pub struct MonitorParts {
    pub sites: Arc<SiteRegistry>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub detector: ChangeDetector,
    pub rating: RatingDispatcher,
    pub recorder: Arc<AnalysisRecorder>,
    pub notifier: Arc<dyn NotifyBackend>,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// URLs processed at once. 1 means strictly sequential.
    pub max_concurrent: usize,
    /// Per-record notifications fire at or above this rating.
    pub min_rating: Rating,
    /// Where run logs go; `None` disables them.
    pub runs_dir: Option<PathBuf>,
}

pub struct Monitor {
    sites: Arc<SiteRegistry>,
    fetcher: Arc<dyn PageFetcher>,
    snapshots: Arc<dyn SnapshotStore>,
    detector: ChangeDetector,
    rating: RatingDispatcher,
    recorder: Arc<AnalysisRecorder>,
    notifier: Arc<dyn NotifyBackend>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(parts: MonitorParts, settings: MonitorSettings) -> Self {
        Self {
            sites: parts.sites,
            fetcher: parts.fetcher,
            snapshots: parts.snapshots,
            detector: parts.detector,
            rating: parts.rating,
            recorder: parts.recorder,
            notifier: parts.notifier,
            settings,
        }
    }

    /// One pass over all active sites. Only a missing or unreadable site
    /// list fails the run.
    pub async fn run(
        &self,
        progress: Option<UnboundedSender<RunProgress>>,
    ) -> Result<RunSummary, RunError> {
        let sites = dedupe(self.sites.active_sites().await.map_err(RunError::Sites)?);
        if sites.is_empty() {
            return Err(RunError::NoActiveSites);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let log = RunLog::new(run_id);
        info!(
            %run_id,
            sites = sites.len(),
            oracle = self.rating.oracle_name().unwrap_or("none"),
            "Starting monitor run"
        );
        emit(&progress, RunProgress::Started {
            run_id,
            total: sites.len(),
        });

        let results: Vec<UrlResult> = stream::iter(sites.iter().enumerate())
            .map(|(index, site)| {
                let progress = progress.clone();
                let log = &log;
                async move {
                    emit(&progress, RunProgress::UrlStarted {
                        url: site.url.clone(),
                        index,
                    });
                    let result = self.process(run_id, site, log).await;
                    emit(&progress, RunProgress::UrlFinished {
                        result: Box::new(result.clone()),
                    });
                    result
                }
            })
            .buffered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        if let Err(e) = self.notifier.send_digest(&summary).await {
            warn!(error = %e, "Digest notification failed");
        }
        if let Some(dir) = &self.settings.runs_dir {
            if let Err(e) = log.save(dir, &summary) {
                warn!(error = %e, "Failed to save run log");
            }
        }

        info!(
            %run_id,
            analyzed = summary.analyzed(),
            changed = summary.changed(),
            errored = summary.errored(),
            degraded = summary.degraded(),
            "Monitor run finished"
        );
        emit(&progress, RunProgress::Finished {
            summary: Box::new(summary.clone()),
        });
        Ok(summary)
    }

    /// Repeat [`Monitor::run`] every `every` until Ctrl-C. A failed run is
    /// logged and the loop keeps going.
    pub async fn run_every(&self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run(None).await {
                        Ok(summary) => info!("{summary}"),
                        Err(e) => error!(error = %e, "Monitor run failed"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested, stopping scheduler");
                    return;
                }
            }
        }
    }

    async fn process(&self, run_id: Uuid, site: &MonitoredSite, log: &RunLog) -> UrlResult {
        let url = site.url.as_str();

        let raw = match self.fetcher.fetch(url).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url, reason = e.reason_code(), error = %e, "Fetch failed");
                log.log(EventKind::Fetch {
                    url: url.to_string(),
                    fetcher: self.fetcher.name().to_string(),
                    success: false,
                    content_chars: 0,
                    items: 0,
                });
                return UrlResult {
                    url: url.to_string(),
                    site_name: site.name.clone(),
                    status: UrlStatus::FetchFailed {
                        reason: e.reason_code().to_string(),
                        message: e.to_string(),
                    },
                };
            }
        };
        log.log(EventKind::Fetch {
            url: url.to_string(),
            fetcher: raw.fetcher.clone(),
            success: true,
            content_chars: raw.text.chars().count(),
            items: raw.items.len(),
        });

        let previous = match self.snapshots.get(url).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(url, error = %e, "Snapshot unreadable, treating as first observation");
                None
            }
        };

        let detection = self.detector.detect(previous.as_ref(), &raw);
        log.log(EventKind::Detect {
            url: url.to_string(),
            reason: detection.significance.reason_code().to_string(),
            similarity: detection.significance.similarity(),
            new_items: detection.new_items.len(),
        });

        // The baseline always moves to the latest fetch.
        let snapshot = next_snapshot(
            previous.as_ref(),
            url,
            &detection.normalized,
            &detection.content_hash,
            &raw.items,
            raw.fetched_at,
        );
        if let Err(e) = self.snapshots.put(&snapshot).await {
            warn!(url, error = %e, "Failed to store snapshot");
            log.log(EventKind::SnapshotFailed {
                url: url.to_string(),
                error: e.to_string(),
            });
        }

        let draft = if detection.is_significant() {
            self.rate(site, &detection, &raw.items, log).await
        } else {
            info!(url, similarity = ?detection.significance.similarity(), "No significant change");
            AnalysisDraft {
                changes_detected: false,
                reason: Some(detection.significance.reason_code().to_string()),
                similarity: detection.significance.similarity(),
                ..Default::default()
            }
        };
        let draft = AnalysisDraft {
            fetcher: Some(raw.fetcher.clone()),
            ..draft
        };

        let recorded = self.recorder.record(run_id, url, &site.name, draft).await;
        log.log(EventKind::Record {
            url: url.to_string(),
            record_id: recorded.record.id,
            outcome: recorded.outcome.label().to_string(),
        });

        if let Some(peak) = recorded.record.peak_rating() {
            if peak >= self.settings.min_rating {
                log.log(EventKind::Notify {
                    url: url.to_string(),
                    rating: peak.value(),
                });
                if let Err(e) = self.notifier.notify(&recorded.record).await {
                    warn!(url, error = %e, "Notification failed");
                }
            }
        }

        UrlResult {
            url: url.to_string(),
            site_name: site.name.clone(),
            status: UrlStatus::Recorded {
                record: recorded.record,
                write: recorded.outcome,
            },
        }
    }

    async fn rate(
        &self,
        site: &MonitoredSite,
        detection: &Detection,
        fetched_items: &[ExtractedItem],
        log: &RunLog,
    ) -> AnalysisDraft {
        // New items get the oracle's attention when they are what triggered the run.
        let items = match detection.significance {
            Significance::NewItems { .. } => detection.new_items.as_slice(),
            _ => fetched_items,
        };
        let input = RatingInput {
            url: &site.url,
            site_name: &site.name,
            content: &detection.normalized,
            diff_summary: &detection.diff_summary,
            items,
        };

        let base = AnalysisDraft {
            changes_detected: true,
            similarity: detection.significance.similarity(),
            ..Default::default()
        };

        match self.rating.rate(&input).await {
            Ok(result) => {
                log.log(EventKind::Rating {
                    url: site.url.clone(),
                    score: Some(result.score.value()),
                    failure: None,
                });
                AnalysisDraft {
                    rating: Some(result),
                    reason: Some(detection.significance.reason_code().to_string()),
                    ..base
                }
            }
            Err(failure) => {
                warn!(url = %site.url, reason = failure.reason_code(), error = %failure, "Rating failed, recording unrated");
                log.log(EventKind::Rating {
                    url: site.url.clone(),
                    score: None,
                    failure: Some(failure.reason_code().to_string()),
                });
                AnalysisDraft {
                    reason: Some(failure.reason_code().to_string()),
                    explanation: Some(failure.to_string()),
                    ..base
                }
            }
        }
    }
}

/// Keep the first site for each URL so no URL is recorded twice per run.
fn dedupe(sites: Vec<MonitoredSite>) -> Vec<MonitoredSite> {
    let mut seen = HashSet::new();
    sites
        .into_iter()
        .filter(|s| {
            let fresh = seen.insert(s.url.clone());
            if !fresh {
                warn!(url = %s.url, "Duplicate site in list, skipping");
            }
            fresh
        })
        .collect()
}

fn emit(progress: &Option<UnboundedSender<RunProgress>>, event: RunProgress) {
    if let Some(tx) = progress {
        // A dropped receiver just means nobody is watching.
        let _ = tx.send(event);
    }
}
