use std::sync::Arc;

use pagewatch_common::{Rating, RatingResult};
use pagewatch_monitor::recorder::{AnalysisDraft, AnalysisRecorder, WriteOutcome};
use pagewatch_monitor::store::{AnalysisStore, JsonlAnalysisLog};
use pagewatch_monitor::testing::{FailingAnalysisStore, MemoryAnalysisStore};
use uuid::Uuid;

fn rated(score: i64) -> AnalysisDraft {
    AnalysisDraft {
        rating: Some(RatingResult {
            score: Rating::new(score).unwrap(),
            explanation: "Ny detaljplan för centrum".into(),
            items: vec![],
        }),
        changes_detected: true,
        reason: Some("changed".into()),
        similarity: Some(0.42),
        fetcher: Some("direct".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn primary_failure_lands_in_local_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(JsonlAnalysisLog::new(dir.path().join("analyses.jsonl")));
    let recorder = AnalysisRecorder::new(Some(Arc::new(FailingAnalysisStore)), log.clone());

    let recorded = recorder
        .record(Uuid::new_v4(), "https://a.example.se", "A", rated(4))
        .await;

    assert!(matches!(recorded.outcome, WriteOutcome::Fallback { .. }));
    assert!(recorded.outcome.is_degraded());

    let stored = log.for_url("https://a.example.se", 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, recorded.record.id);
    assert_eq!(stored[0].similarity, Some(0.42));
}

#[tokio::test]
async fn missing_primary_is_reported_as_fallback() {
    let fallback = Arc::new(MemoryAnalysisStore::new());
    let recorder = AnalysisRecorder::new(None, fallback.clone());

    let recorded = recorder
        .record(Uuid::new_v4(), "https://a.example.se", "A", AnalysisDraft::default())
        .await;

    assert_eq!(
        recorded.outcome,
        WriteOutcome::Fallback {
            primary_error: "primary store not configured".into()
        }
    );
    assert_eq!(fallback.records().len(), 1);
}

#[tokio::test]
async fn both_stores_failing_is_reported_not_raised() {
    let recorder = AnalysisRecorder::new(
        Some(Arc::new(FailingAnalysisStore)),
        Arc::new(FailingAnalysisStore),
    );

    let recorded = recorder
        .record(Uuid::new_v4(), "https://a.example.se", "A", rated(2))
        .await;

    assert!(matches!(recorded.outcome, WriteOutcome::BothFailed { .. }));
    assert_eq!(recorded.record.overall_rating.map(|r| r.value()), Some(2));
}

#[tokio::test]
async fn every_call_appends_a_new_record() {
    let primary = Arc::new(MemoryAnalysisStore::new());
    let recorder = AnalysisRecorder::new(Some(primary.clone()), Arc::new(MemoryAnalysisStore::new()));
    let run_id = Uuid::new_v4();

    let first = recorder.record(run_id, "https://a.example.se", "A", rated(3)).await;
    let second = recorder.record(run_id, "https://b.example.se", "B", rated(5)).await;

    assert_eq!(first.outcome, WriteOutcome::Primary);
    assert_ne!(first.record.id, second.record.id);
    assert_eq!(primary.records().len(), 2);
}

#[tokio::test]
async fn history_reads_local_log_when_primary_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(JsonlAnalysisLog::new(dir.path().join("analyses.jsonl")));
    let recorder = AnalysisRecorder::new(Some(Arc::new(FailingAnalysisStore)), log);

    recorder.record(Uuid::new_v4(), "https://a.example.se", "A", rated(3)).await;
    recorder.record(Uuid::new_v4(), "https://b.example.se", "B", rated(4)).await;
    recorder.record(Uuid::new_v4(), "https://a.example.se", "A", rated(5)).await;

    let history = recorder.history(Some("https://a.example.se"), 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].overall_rating.map(|r| r.value()), Some(5));

    let latest = recorder.latest().await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].url, "https://a.example.se");
    assert_eq!(latest[0].overall_rating.map(|r| r.value()), Some(5));
}

#[tokio::test]
async fn records_written_during_an_outage_stay_visible_after_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("analyses.jsonl");

    let during_outage = AnalysisRecorder::new(
        Some(Arc::new(FailingAnalysisStore)),
        Arc::new(JsonlAnalysisLog::new(&log_path)),
    );
    let degraded = during_outage
        .record(Uuid::new_v4(), "https://a.example.se", "A", rated(4))
        .await;
    assert!(degraded.outcome.is_degraded());

    let primary = Arc::new(MemoryAnalysisStore::new());
    let recovered = AnalysisRecorder::new(
        Some(primary.clone()),
        Arc::new(JsonlAnalysisLog::new(&log_path)),
    );
    let healthy = recovered
        .record(Uuid::new_v4(), "https://b.example.se", "B", rated(2))
        .await;
    assert_eq!(healthy.outcome, WriteOutcome::Primary);

    let history = recovered.history(Some("https://a.example.se"), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, degraded.record.id);

    let all = recovered.history(None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, healthy.record.id);

    let latest = recovered.latest().await.unwrap();
    let urls: Vec<&str> = latest.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.example.se", "https://b.example.se"]);
}

#[tokio::test]
async fn records_in_both_stores_are_not_duplicated() {
    let primary = Arc::new(MemoryAnalysisStore::new());
    let local = Arc::new(MemoryAnalysisStore::new());
    let recorder = AnalysisRecorder::new(Some(primary.clone()), local.clone());

    let recorded = recorder
        .record(Uuid::new_v4(), "https://a.example.se", "A", rated(3))
        .await;
    local.insert(&recorded.record).await.unwrap();

    let history = recorder.history(None, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    let latest = recorder.latest().await.unwrap();
    assert_eq!(latest.len(), 1);
}
