//! Persistence for analyses and the site list.
//!
//! Each concern has a Postgres implementation (primary) and a local-file
//! implementation (fallback). Coordination between the two lives in
//! [`crate::recorder`] and [`crate::sites`].

mod json_sites;
mod jsonl;
mod pg;

pub use json_sites::JsonSiteStore;
pub use jsonl::JsonlAnalysisLog;
pub use pg::{connect_lazy, migrate, PgAnalysisStore, PgSiteStore};

use std::path::Path;

use async_trait::async_trait;
use pagewatch_common::{AnalysisRecord, MonitoredSite};

use crate::error::StoreError;

/// Append-only analysis history.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError>;

    /// Newest first.
    async fn for_url(&self, url: &str, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError>;

    /// Most recent record for each URL, ordered by URL.
    async fn latest_per_url(&self) -> Result<Vec<AnalysisRecord>, StoreError>;

    fn name(&self) -> &str;
}

/// Editable fields of a monitored site.
#[derive(Debug, Clone, Default)]
pub struct SitePatch {
    pub name: Option<String>,
    pub category: Option<String>,
}

/// The watch list. URLs are unique.
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn list(&self, active_only: bool) -> Result<Vec<MonitoredSite>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the URL is already present.
    async fn add(&self, site: &MonitoredSite) -> Result<(), StoreError>;

    /// Insert or overwrite by URL.
    async fn upsert(&self, site: &MonitoredSite) -> Result<(), StoreError>;

    async fn update(&self, url: &str, patch: &SitePatch) -> Result<(), StoreError>;

    async fn set_active(&self, url: &str, active: bool) -> Result<(), StoreError>;

    async fn remove(&self, url: &str) -> Result<(), StoreError>;

    fn name(&self) -> &str;
}

/// Write `bytes` to `path` via a sibling temp file and rename, so readers
/// never observe a partial file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
