//! Run log: persisted JSON timeline of every step taken during a run.
//!
//! Each run produces a single `{data_dir}/runs/{run_id}.json` file containing
//! an ordered list of events with timestamps.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::summary::RunSummary;

pub struct RunLog {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    events: Mutex<Vec<RunEvent>>,
}

#[derive(Debug, Clone, Serialize)]
struct RunEvent {
    seq: usize,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Fetch {
        url: String,
        fetcher: String,
        success: bool,
        content_chars: usize,
        items: usize,
    },
    Detect {
        url: String,
        reason: String,
        similarity: Option<f64>,
        new_items: usize,
    },
    SnapshotFailed {
        url: String,
        error: String,
    },
    Rating {
        url: String,
        score: Option<u8>,
        failure: Option<String>,
    },
    Record {
        url: String,
        record_id: Uuid,
        outcome: String,
    },
    Notify {
        url: String,
        rating: u8,
    },
}

impl RunLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// URLs may be processed concurrently, so logging takes `&self`.
    pub fn log(&self, kind: EventKind) {
        let Ok(mut events) = self.events.lock() else {
            return;
        };
        let seq = events.len();
        events.push(RunEvent {
            seq,
            ts: Utc::now(),
            kind,
        });
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the run log to JSON and write it under `runs_dir`.
    /// Returns the file path on success.
    pub fn save(&self, runs_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(runs_dir)?;
        let path = runs_dir.join(format!("{}.json", self.run_id));

        let events = self
            .events
            .lock()
            .map(|e| e.clone())
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;

        let output = SerializedRunLog {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: summary.finished_at,
            stats: SerializedStats::from(summary),
            events: &events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = events.len(), "Run log saved");

        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Serialization wrappers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: SerializedStats,
    events: &'a [RunEvent],
}

#[derive(Serialize)]
struct SerializedStats {
    analyzed: usize,
    changed: usize,
    unchanged: usize,
    errored: usize,
    rating_failures: usize,
    highest_rating: Option<u8>,
    degraded: bool,
}

impl From<&RunSummary> for SerializedStats {
    fn from(s: &RunSummary) -> Self {
        Self {
            analyzed: s.analyzed(),
            changed: s.changed(),
            unchanged: s.unchanged(),
            errored: s.errored(),
            rating_failures: s.rating_failures(),
            highest_rating: s.highest_rating().map(|r| r.value()),
            degraded: s.degraded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_numbered_events() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(Uuid::new_v4());
        log.log(EventKind::Fetch {
            url: "https://a.se".into(),
            fetcher: "direct".into(),
            success: true,
            content_chars: 120,
            items: 0,
        });
        log.log(EventKind::Detect {
            url: "https://a.se".into(),
            reason: "first-observation".into(),
            similarity: None,
            new_items: 0,
        });

        let summary = RunSummary {
            run_id: log.run_id,
            started_at: log.started_at,
            finished_at: Utc::now(),
            results: vec![],
        };
        let path = log.save(dir.path(), &summary).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let events = json["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["seq"], 1);
        assert_eq!(events[1]["type"], "detect");
        assert_eq!(json["stats"]["analyzed"], 0);
    }
}
