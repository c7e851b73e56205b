use std::fmt;
use std::future::Future;
use std::sync::Arc;

use pagewatch_common::MonitoredSite;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{SitePatch, SiteStore};

/// Result of one write against one store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StoreWrite {
    Ok,
    Failed(String),
    /// Store not configured.
    Skipped,
}

impl StoreWrite {
    pub fn is_ok(&self) -> bool {
        matches!(self, StoreWrite::Ok)
    }
}

impl fmt::Display for StoreWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreWrite::Ok => write!(f, "ok"),
            StoreWrite::Failed(e) => write!(f, "failed ({e})"),
            StoreWrite::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-store outcome of a site-list change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualWrite {
    pub primary: StoreWrite,
    pub local: StoreWrite,
}

impl DualWrite {
    /// At least one store took the change.
    pub fn succeeded(&self) -> bool {
        self.primary.is_ok() || self.local.is_ok()
    }

    pub fn is_degraded(&self) -> bool {
        !(self.primary.is_ok() && self.local.is_ok())
    }
}

/// Summary of [`SiteRegistry::sync_local_to_primary`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

/// The watch list across the primary database and the local JSON file.
/// Writes go to both; reads prefer the primary.
pub struct SiteRegistry {
    primary: Option<Arc<dyn SiteStore>>,
    local: Arc<dyn SiteStore>,
}

impl SiteRegistry {
    pub fn new(primary: Option<Arc<dyn SiteStore>>, local: Arc<dyn SiteStore>) -> Self {
        Self { primary, local }
    }

    /// Primary list when it answers with at least one site, else the local file.
    pub async fn list(&self, active_only: bool) -> Result<Vec<MonitoredSite>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.list(active_only).await {
                Ok(sites) if !sites.is_empty() => return Ok(sites),
                Ok(_) => info!(store = primary.name(), "Primary site list empty, using local file"),
                Err(e) => warn!(store = primary.name(), error = %e, "Primary site list unavailable, using local file"),
            }
        }
        self.local.list(active_only).await
    }

    pub async fn active_sites(&self) -> Result<Vec<MonitoredSite>, StoreError> {
        self.list(true).await
    }

    pub async fn add(&self, site: &MonitoredSite) -> Result<DualWrite, StoreError> {
        self.write_both("add", |store| async move { store.add(site).await })
            .await
    }

    pub async fn update(&self, url: &str, patch: &SitePatch) -> Result<DualWrite, StoreError> {
        self.write_both("update", |store| async move { store.update(url, patch).await })
            .await
    }

    pub async fn set_active(&self, url: &str, active: bool) -> Result<DualWrite, StoreError> {
        self.write_both("set_active", |store| async move { store.set_active(url, active).await })
            .await
    }

    pub async fn remove(&self, url: &str) -> Result<DualWrite, StoreError> {
        self.write_both("remove", |store| async move { store.remove(url).await })
            .await
    }

    /// Upsert every local site into the primary store.
    pub async fn sync_local_to_primary(&self) -> Result<SyncReport, StoreError> {
        let Some(primary) = &self.primary else {
            return Ok(SyncReport::default());
        };

        let mut report = SyncReport::default();
        for site in self.local.list(false).await? {
            match primary.upsert(&site).await {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    warn!(url = %site.url, error = %e, "Failed to sync site to primary store");
                    report.failed += 1;
                }
            }
        }
        info!(synced = report.synced, failed = report.failed, "Local site list synced");
        Ok(report)
    }

    /// Apply `op` to both stores. Duplicate and not-found errors are only
    /// surfaced when no store accepted the change.
    async fn write_both<'a, F, Fut>(&'a self, action: &str, op: F) -> Result<DualWrite, StoreError>
    where
        F: Fn(&'a dyn SiteStore) -> Fut,
        Fut: Future<Output = Result<(), StoreError>> + 'a,
    {
        let mut rejection = None;

        let primary = match &self.primary {
            Some(store) => outcome(op(store.as_ref()).await, store.name(), action, &mut rejection),
            None => StoreWrite::Skipped,
        };
        let local = outcome(op(self.local.as_ref()).await, self.local.name(), action, &mut rejection);

        let result = DualWrite { primary, local };
        if !result.succeeded() {
            if let Some(e) = rejection {
                return Err(e);
            }
        }
        Ok(result)
    }
}

fn outcome(
    result: Result<(), StoreError>,
    store: &str,
    action: &str,
    rejection: &mut Option<StoreError>,
) -> StoreWrite {
    match result {
        Ok(()) => StoreWrite::Ok,
        Err(e) => {
            warn!(store, action, error = %e, "Site store write failed");
            let message = e.to_string();
            if matches!(e, StoreError::Duplicate(_) | StoreError::NotFound(_)) && rejection.is_none() {
                *rejection = Some(e);
            }
            StoreWrite::Failed(message)
        }
    }
}
