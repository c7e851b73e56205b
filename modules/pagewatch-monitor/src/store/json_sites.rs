use std::path::PathBuf;

use async_trait::async_trait;
use pagewatch_common::MonitoredSite;
use tokio::sync::Mutex;

use super::{write_atomic, SitePatch, SiteStore};
use crate::error::StoreError;

/// Site list kept in a local JSON file.
pub struct JsonSiteStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonSiteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<MonitoredSite>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    async fn save(&self, sites: &[MonitoredSite]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(sites)?;
        write_atomic(&self.path, &json).await
    }

    /// Load, apply `edit` to the site with `url`, save.
    async fn modify(
        &self,
        url: &str,
        edit: impl FnOnce(&mut MonitoredSite),
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sites = self.load().await?;
        let site = sites
            .iter_mut()
            .find(|s| s.url == url)
            .ok_or_else(|| StoreError::NotFound(url.to_string()))?;
        edit(site);
        self.save(&sites).await
    }
}

#[async_trait]
impl SiteStore for JsonSiteStore {
    async fn list(&self, active_only: bool) -> Result<Vec<MonitoredSite>, StoreError> {
        let sites = self.load().await?;
        Ok(sites
            .into_iter()
            .filter(|s| !active_only || s.active)
            .collect())
    }

    async fn add(&self, site: &MonitoredSite) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sites = self.load().await?;
        if sites.iter().any(|s| s.url == site.url) {
            return Err(StoreError::Duplicate(site.url.clone()));
        }
        sites.push(site.clone());
        self.save(&sites).await
    }

    async fn upsert(&self, site: &MonitoredSite) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sites = self.load().await?;
        match sites.iter_mut().find(|s| s.url == site.url) {
            Some(existing) => *existing = site.clone(),
            None => sites.push(site.clone()),
        }
        self.save(&sites).await
    }

    async fn update(&self, url: &str, patch: &SitePatch) -> Result<(), StoreError> {
        self.modify(url, |site| {
            if let Some(name) = &patch.name {
                site.name = name.clone();
            }
            if let Some(category) = &patch.category {
                site.category = category.clone();
            }
        })
        .await
    }

    async fn set_active(&self, url: &str, active: bool) -> Result<(), StoreError> {
        self.modify(url, |site| site.active = active).await
    }

    async fn remove(&self, url: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sites = self.load().await?;
        let before = sites.len();
        sites.retain(|s| s.url != url);
        if sites.len() == before {
            return Err(StoreError::NotFound(url.to_string()));
        }
        self.save(&sites).await
    }

    fn name(&self) -> &str {
        "json"
    }
}
