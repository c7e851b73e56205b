use async_trait::async_trait;
use pagewatch_common::AnalysisRecord;

use crate::summary::RunSummary;

/// Pluggable notification backend for monitor runs.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Send a single high-interest analysis.
    async fn notify(&self, record: &AnalysisRecord) -> anyhow::Result<()>;

    /// Send a digest of a finished run.
    async fn send_digest(&self, summary: &RunSummary) -> anyhow::Result<()>;
}
