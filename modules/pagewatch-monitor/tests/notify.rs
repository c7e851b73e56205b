use std::sync::Arc;

use async_trait::async_trait;
use pagewatch_common::AnalysisRecord;
use pagewatch_monitor::notify::{FileDigest, NotifyBackend, NotifyFanout};
use pagewatch_monitor::summary::RunSummary;
use pagewatch_monitor::testing::{
    rating, rating_reply, MockFailure, MockFetcher, RecordingNotifier, ScriptedOracle, TestMonitor,
};

const URL_A: &str = "https://kommun.example.se/nyheter";
const URL_B: &str = "https://tidning.example.se/lokalt";

struct BrokenBackend;

#[async_trait]
impl NotifyBackend for BrokenBackend {
    async fn notify(&self, _record: &AnalysisRecord) -> anyhow::Result<()> {
        anyhow::bail!("webhook returned 500")
    }

    async fn send_digest(&self, _summary: &RunSummary) -> anyhow::Result<()> {
        anyhow::bail!("webhook returned 500")
    }
}

struct Shared(Arc<RecordingNotifier>);

#[async_trait]
impl NotifyBackend for Shared {
    async fn notify(&self, record: &AnalysisRecord) -> anyhow::Result<()> {
        self.0.notify(record).await
    }

    async fn send_digest(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.0.send_digest(summary).await
    }
}

async fn finished_run() -> RunSummary {
    let t = TestMonitor::builder()
        .site(URL_A, "Kommunen")
        .site(URL_B, "Tidningen")
        .fetcher(
            MockFetcher::new()
                .on_page(URL_A, "Detaljplan för nya bostäder ute på samråd")
                .on_failure(URL_B, MockFailure::Blocked),
        )
        .oracle(ScriptedOracle::replying(&rating_reply(5, "Stor ny detaljplan")))
        .build();
    t.monitor.run(None).await.unwrap()
}

#[tokio::test]
async fn file_digest_lists_highlights_and_failures() {
    let summary = finished_run().await;
    let dir = tempfile::tempdir().unwrap();

    FileDigest::new(dir.path(), rating(4))
        .send_digest(&summary)
        .await
        .unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    let md = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
    assert!(md.contains("[Kommunen](https://kommun.example.se/nyheter)"));
    assert!(md.contains("Stor ny detaljplan"));
    assert!(md.contains("Tidningen (https://tidning.example.se/lokalt): failed: blocked"));
}

#[tokio::test]
async fn fanout_keeps_going_past_a_broken_backend() {
    let summary = finished_run().await;
    let recording = Arc::new(RecordingNotifier::new());
    let fanout = NotifyFanout::new()
        .with("broken", Box::new(BrokenBackend))
        .with("recording", Box::new(Shared(recording.clone())));

    fanout.send_digest(&summary).await.unwrap();
    let record = summary.results[0].record().unwrap();
    fanout.notify(record).await.unwrap();

    assert_eq!(fanout.len(), 2);
    assert_eq!(recording.digests(), 1);
    assert_eq!(recording.notified().len(), 1);
}
