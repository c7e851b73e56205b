use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use pagewatch_common::AnalysisRecord;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::AnalysisStore;
use crate::error::StoreError;

/// Local append-only analysis log, one JSON record per line.
pub struct JsonlAnalysisLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAnalysisLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Every readable record in file order. Unparseable lines are skipped.
    async fn read_all(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let records = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %self.path.display(), line = n + 1, error = %e, "Skipping corrupt analysis log line");
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

fn newest_first(mut records: Vec<AnalysisRecord>, limit: usize) -> Vec<AnalysisRecord> {
    records.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
    records.truncate(limit);
    records
}

#[async_trait]
impl AnalysisStore for JsonlAnalysisLog {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(newest_first(self.read_all().await?, limit))
    }

    async fn for_url(&self, url: &str, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let records = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.url == url)
            .collect();
        Ok(newest_first(records, limit))
    }

    async fn latest_per_url(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut latest: HashMap<String, AnalysisRecord> = HashMap::new();
        for record in self.read_all().await? {
            match latest.get(&record.url) {
                Some(existing) if existing.analyzed_at >= record.analyzed_at => {}
                _ => {
                    latest.insert(record.url.clone(), record);
                }
            }
        }
        let mut out: Vec<_> = latest.into_values().collect();
        out.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(out)
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(url: &str, minutes_ago: i64) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            url: url.to_string(),
            site_name: "Site".into(),
            overall_rating: None,
            explanation: None,
            changes_detected: false,
            reason: Some("unchanged".into()),
            similarity: Some(1.0),
            fetcher: Some("direct".into()),
            analyzed_at: Utc::now() - Duration::minutes(minutes_ago),
            items: vec![],
        }
    }

    #[tokio::test]
    async fn appended_records_read_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAnalysisLog::new(dir.path().join("analyses.jsonl"));

        log.insert(&record("https://a.se", 30)).await.unwrap();
        log.insert(&record("https://b.se", 20)).await.unwrap();
        log.insert(&record("https://a.se", 10)).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].analyzed_at > recent[1].analyzed_at);

        let a = log.for_url("https://a.se", 1).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].analyzed_at, recent[0].analyzed_at);

        let latest = log.latest_per_url().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].url, "https://a.se");
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAnalysisLog::new(dir.path().join("none.jsonl"));
        assert!(log.recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyses.jsonl");
        let log = JsonlAnalysisLog::new(&path);
        log.insert(&record("https://a.se", 5)).await.unwrap();

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        std::fs::write(&path, content).unwrap();

        assert_eq!(log.recent(10).await.unwrap().len(), 1);
    }
}
