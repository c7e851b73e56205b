use std::sync::Arc;

use pagewatch_monitor::error::StoreError;
use pagewatch_monitor::sites::{SiteRegistry, StoreWrite};
use pagewatch_monitor::store::{JsonSiteStore, SitePatch, SiteStore};
use pagewatch_monitor::testing::{site, FailingSiteStore, MemorySiteStore};

#[tokio::test]
async fn writes_go_to_both_stores() {
    let primary = Arc::new(MemorySiteStore::new());
    let local = Arc::new(MemorySiteStore::new());
    let registry = SiteRegistry::new(Some(primary.clone()), local.clone());

    let write = registry.add(&site("https://a.example.se", "A")).await.unwrap();
    assert_eq!(write.primary, StoreWrite::Ok);
    assert_eq!(write.local, StoreWrite::Ok);
    assert!(!write.is_degraded());

    registry
        .update(
            "https://a.example.se",
            &SitePatch {
                name: Some("Kommunen".into()),
                category: Some("kommun".into()),
            },
        )
        .await
        .unwrap();
    registry.set_active("https://a.example.se", false).await.unwrap();

    for store in [&primary, &local] {
        let sites = store.sites();
        assert_eq!(sites[0].name, "Kommunen");
        assert_eq!(sites[0].category, "kommun");
        assert!(!sites[0].active);
    }
}

#[tokio::test]
async fn unreachable_primary_degrades_to_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(JsonSiteStore::new(dir.path().join("sites.json")));
    let registry = SiteRegistry::new(Some(Arc::new(FailingSiteStore)), local.clone());

    let write = registry.add(&site("https://a.example.se", "A")).await.unwrap();
    assert!(matches!(write.primary, StoreWrite::Failed(_)));
    assert_eq!(write.local, StoreWrite::Ok);
    assert!(write.succeeded());

    let active = registry.active_sites().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(local.list(false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_primary_reads_from_local() {
    let local = Arc::new(MemorySiteStore::with_sites(vec![site("https://a.example.se", "A")]));
    let registry = SiteRegistry::new(Some(Arc::new(MemorySiteStore::new())), local);

    assert_eq!(registry.list(true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_everywhere_is_an_error() {
    let registry = SiteRegistry::new(
        Some(Arc::new(MemorySiteStore::with_sites(vec![site("https://a.example.se", "A")]))),
        Arc::new(MemorySiteStore::with_sites(vec![site("https://a.example.se", "A")])),
    );

    let err = registry.add(&site("https://a.example.se", "A")).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[tokio::test]
async fn removing_unknown_site_is_not_found() {
    let registry = SiteRegistry::new(None, Arc::new(MemorySiteStore::new()));
    let err = registry.remove("https://nope.example.se").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn sync_upserts_local_sites_into_primary() {
    let primary = Arc::new(MemorySiteStore::with_sites(vec![site("https://a.example.se", "Old name")]));
    let local = Arc::new(MemorySiteStore::with_sites(vec![
        site("https://a.example.se", "A"),
        site("https://b.example.se", "B"),
    ]));
    let registry = SiteRegistry::new(Some(primary.clone()), local);

    let report = registry.sync_local_to_primary().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);

    let sites = primary.sites();
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0].name, "A");
}
