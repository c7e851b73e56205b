use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PagewatchError;

pub const DEFAULT_CATEGORY: &str = "general";

// --- Rating ---

/// Interest score on the fixed 1..=5 scale. Construction is the only
/// validation point, so a `Rating` in hand is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, PagewatchError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(PagewatchError::RatingOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = PagewatchError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 {
        r.0
    }
}

impl From<Rating> for i16 {
    fn from(r: Rating) -> i16 {
        r.0 as i16
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

// --- Sites ---

/// A URL on the watch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredSite {
    pub url: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_true() -> bool {
    true
}

impl MonitoredSite {
    /// Build a site after checking the URL is absolute http(s). A blank name
    /// falls back to the host.
    pub fn new(url: &str, name: &str, category: Option<&str>) -> Result<Self, PagewatchError> {
        let url = validate_url(url)?;
        let name = match name.trim() {
            "" => url::Url::parse(&url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| url.clone()),
            n => n.to_string(),
        };
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();

        Ok(Self {
            url,
            name,
            category,
            active: true,
            created_at: Utc::now(),
        })
    }
}

/// Trim and check that `raw` is an absolute http or https URL.
pub fn validate_url(raw: &str) -> Result<String, PagewatchError> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed).map_err(|e| PagewatchError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        scheme => Err(PagewatchError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{scheme}' or missing host"),
        }),
    }
}

// --- Fetched content ---

/// A discrete item (news entry) found on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Set when the item first appeared in a stored snapshot.
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
}

impl ExtractedItem {
    /// Key used to match the same item across fetches.
    pub fn match_key(&self) -> String {
        self.title.trim().to_lowercase()
    }
}

/// Current page content in the shape both fetch paths produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
    /// Name of the fetch path that produced this content.
    pub fetcher: String,
    pub fetched_at: DateTime<Utc>,
}

/// Last-known content for a URL, the baseline for change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub url: String,
    pub text: String,
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
}

// --- Rating results ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedItem {
    pub title: String,
    pub date: Option<String>,
    pub score: Rating,
    pub excerpt: Option<String>,
}

/// Validated oracle verdict for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingResult {
    pub score: Rating,
    pub explanation: String,
    #[serde(default)]
    pub items: Vec<RatedItem>,
}

// --- Analysis history ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub date: Option<String>,
    pub rating: Rating,
    pub content: String,
}

impl From<RatedItem> for NewsItem {
    fn from(item: RatedItem) -> Self {
        Self {
            title: item.title,
            date: item.date,
            rating: item.score,
            content: item.excerpt.unwrap_or_default(),
        }
    }
}

/// One append-only history row: a URL's result for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub url: String,
    pub site_name: String,
    pub overall_rating: Option<Rating>,
    pub explanation: Option<String>,
    pub changes_detected: bool,
    /// Machine-readable reason, e.g. `unchanged` or `rating-unavailable`.
    pub reason: Option<String>,
    pub similarity: Option<f64>,
    pub fetcher: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<NewsItem>,
}

impl AnalysisRecord {
    /// Highest rating on the record, counting its items.
    pub fn peak_rating(&self) -> Option<Rating> {
        self.items
            .iter()
            .map(|i| i.rating)
            .chain(self.overall_rating)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_accepts_bounds() {
        assert_eq!(Rating::new(1).unwrap().value(), 1);
        assert_eq!(Rating::new(5).unwrap().value(), 5);
    }

    #[test]
    fn rating_rejects_out_of_range() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert!(Rating::new(-3).is_err());
    }

    #[test]
    fn rating_deserialize_is_validated() {
        assert!(serde_json::from_str::<Rating>("4").is_ok());
        assert!(serde_json::from_str::<Rating>("7").is_err());
        assert_eq!(serde_json::to_string(&Rating::new(3).unwrap()).unwrap(), "3");
    }

    #[test]
    fn site_defaults_name_to_host_and_category() {
        let site = MonitoredSite::new("https://www.example.se/nyheter", "  ", None).unwrap();
        assert_eq!(site.name, "www.example.se");
        assert_eq!(site.category, DEFAULT_CATEGORY);
        assert!(site.active);
    }

    #[test]
    fn site_rejects_non_http_urls() {
        assert!(MonitoredSite::new("ftp://example.se", "x", None).is_err());
        assert!(MonitoredSite::new("not a url", "x", None).is_err());
        assert!(MonitoredSite::new("file:///etc/passwd", "x", None).is_err());
    }

    #[test]
    fn site_json_without_optional_fields_uses_defaults() {
        let site: MonitoredSite =
            serde_json::from_str(r#"{"url": "https://a.se", "name": "A"}"#).unwrap();
        assert!(site.active);
        assert_eq!(site.category, "general");
    }

    #[test]
    fn peak_rating_includes_items() {
        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            url: "https://a.se".into(),
            site_name: "A".into(),
            overall_rating: Some(Rating::new(2).unwrap()),
            explanation: None,
            changes_detected: true,
            reason: None,
            similarity: None,
            fetcher: None,
            analyzed_at: Utc::now(),
            items: vec![NewsItem {
                title: "Ny skola".into(),
                date: None,
                rating: Rating::new(5).unwrap(),
                content: String::new(),
            }],
        };
        assert_eq!(record.peak_rating().map(Rating::value), Some(5));
    }
}
