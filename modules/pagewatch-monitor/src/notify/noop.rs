use async_trait::async_trait;
use pagewatch_common::AnalysisRecord;

use super::backend::NotifyBackend;
use crate::summary::RunSummary;

/// No-op notification backend.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn notify(&self, _record: &AnalysisRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_digest(&self, _summary: &RunSummary) -> anyhow::Result<()> {
        Ok(())
    }
}
