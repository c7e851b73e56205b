use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagewatch_common::{url_key, ContentSnapshot, ExtractedItem};

use crate::error::StoreError;
use crate::store::write_atomic;

/// Last-known content per URL.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, url: &str) -> Result<Option<ContentSnapshot>, StoreError>;
    async fn put(&self, snapshot: &ContentSnapshot) -> Result<(), StoreError>;
}

/// One JSON file per URL under a directory, named by the SHA-256 of the URL.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", url_key(url)))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, url: &str) -> Result<Option<ContentSnapshot>, StoreError> {
        let path = self.path_for(url);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn put(&self, snapshot: &ContentSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path_for(&snapshot.url), &json).await
    }
}

/// Build the snapshot that replaces `previous` after a fetch. Items that were
/// already known keep their `first_seen`; new ones are stamped `now`.
pub fn next_snapshot(
    previous: Option<&ContentSnapshot>,
    url: &str,
    normalized: &str,
    content_hash: &str,
    items: &[ExtractedItem],
    now: DateTime<Utc>,
) -> ContentSnapshot {
    let known: HashMap<String, Option<DateTime<Utc>>> = previous
        .map(|p| p.items.iter().map(|i| (i.match_key(), i.first_seen)).collect())
        .unwrap_or_default();

    let items = items
        .iter()
        .map(|item| {
            let first_seen = known.get(&item.match_key()).copied().flatten().unwrap_or(now);
            ExtractedItem {
                first_seen: Some(first_seen),
                ..item.clone()
            }
        })
        .collect();

    ContentSnapshot {
        url: url.to_string(),
        text: normalized.to_string(),
        content_hash: content_hash.to_string(),
        captured_at: now,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(title: &str) -> ExtractedItem {
        ExtractedItem {
            title: title.to_string(),
            date: None,
            content: String::new(),
            first_seen: None,
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let url = "https://example.se/nyheter";

        assert!(store.get(url).await.unwrap().is_none());

        let first = next_snapshot(None, url, "a", "h1", &[], Utc::now());
        store.put(&first).await.unwrap();
        let second = next_snapshot(Some(&first), url, "b", "h2", &[], Utc::now());
        store.put(&second).await.unwrap();

        let loaded = store.get(url).await.unwrap().unwrap();
        assert_eq!(loaded.text, "b");
        assert_eq!(loaded.content_hash, "h2");
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let url = "https://example.se";
        std::fs::write(store.path_for(url), b"{oops").unwrap();
        assert!(store.get(url).await.is_err());
    }

    #[test]
    fn first_seen_carries_over_for_known_items() {
        let earlier = Utc::now() - Duration::days(2);
        let now = Utc::now();
        let previous = ContentSnapshot {
            url: "https://a.se".into(),
            text: String::new(),
            content_hash: String::new(),
            captured_at: earlier,
            items: vec![ExtractedItem {
                first_seen: Some(earlier),
                ..item("Ny förskola")
            }],
        };

        let next = next_snapshot(
            Some(&previous),
            "https://a.se",
            "",
            "",
            &[item("  ny förskola "), item("Vägarbete")],
            now,
        );
        assert_eq!(next.items[0].first_seen, Some(earlier));
        assert_eq!(next.items[1].first_seen, Some(now));
    }
}
