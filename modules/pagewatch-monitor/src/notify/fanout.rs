use async_trait::async_trait;
use pagewatch_common::AnalysisRecord;
use tracing::warn;

use super::backend::NotifyBackend;
use crate::summary::RunSummary;

/// Sends every notification to all configured backends. Backend failures are
/// logged and swallowed.
#[derive(Default)]
pub struct NotifyFanout {
    backends: Vec<(String, Box<dyn NotifyBackend>)>,
}

impl NotifyFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, backend: Box<dyn NotifyBackend>) -> Self {
        self.backends.push((name.into(), backend));
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[async_trait]
impl NotifyBackend for NotifyFanout {
    async fn notify(&self, record: &AnalysisRecord) -> anyhow::Result<()> {
        for (name, backend) in &self.backends {
            if let Err(e) = backend.notify(record).await {
                warn!(backend = %name, url = %record.url, error = %e, "Failed to send notification");
            }
        }
        Ok(())
    }

    async fn send_digest(&self, summary: &RunSummary) -> anyhow::Result<()> {
        for (name, backend) in &self.backends {
            if let Err(e) = backend.send_digest(summary).await {
                warn!(backend = %name, error = %e, "Failed to send digest notification");
            }
        }
        Ok(())
    }
}
