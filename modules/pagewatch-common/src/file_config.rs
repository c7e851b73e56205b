use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PagewatchError;

/// TOML-backed configuration loaded from disk.
/// Secrets (API keys, DB URL) stay as env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub monitor: MonitorConfig,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub rating: RatingConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Below this similarity a change is significant.
    pub similarity_threshold: f64,
    /// Treat previously unseen extracted items as significant.
    pub trigger_on_new_items: bool,
    pub max_concurrent_urls: usize,
    pub max_content_chars: usize,
    pub diff_lines: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            trigger_on_new_items: true,
            max_concurrent_urls: 1,
            max_content_chars: 50_000,
            diff_lines: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub primary_cooldown_secs: u64,
    pub extract_items: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            primary_cooldown_secs: 300,
            extract_items: true,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn primary_cooldown(&self) -> Duration {
        Duration::from_secs(self.primary_cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            multiplier: 3,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatingConfig {
    pub model: String,
    /// Page text beyond this many chars is cut from the prompt.
    pub prompt_chars: usize,
    /// Extracted items listed for individual rating.
    pub max_items: usize,
    pub domain_focus: String,
    /// Replaces the built-in system prompt when set.
    pub system_prompt_path: Option<PathBuf>,
    pub assistant_poll_secs: u64,
    pub assistant_timeout_secs: u64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            prompt_chars: 5_000,
            max_items: 5,
            domain_focus: "Local news that matters to residents of the municipality: \
                           construction and infrastructure, changes to public services, \
                           safety issues, political decisions and larger local events."
                .to_string(),
            system_prompt_path: None,
            assistant_poll_secs: 2,
            assistant_timeout_secs: 120,
        }
    }
}

impl RatingConfig {
    pub fn assistant_poll_interval(&self) -> Duration {
        Duration::from_secs(self.assistant_poll_secs)
    }

    pub fn assistant_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn analyses_log(&self) -> PathBuf {
        self.data_dir.join("analyses.jsonl")
    }

    pub fn sites_file(&self) -> PathBuf {
        self.data_dir.join("sites.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub min_rating: u8,
    pub summary_dir: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            min_rating: 4,
            summary_dir: None,
        }
    }
}

impl FileConfig {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), PagewatchError> {
        let t = self.monitor.similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(PagewatchError::Config(format!(
                "monitor.similarity_threshold must be in (0, 1], got {t}"
            )));
        }
        if self.monitor.max_concurrent_urls == 0 {
            return Err(PagewatchError::Config(
                "monitor.max_concurrent_urls must be at least 1".into(),
            ));
        }
        if self.monitor.max_content_chars == 0 {
            return Err(PagewatchError::Config(
                "monitor.max_content_chars must be positive".into(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(PagewatchError::Config("fetch.timeout_secs must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PagewatchError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier == 0 {
            return Err(PagewatchError::Config("retry.multiplier must be at least 1".into()));
        }
        if self.rating.model.trim().is_empty() {
            return Err(PagewatchError::Config("rating.model must not be empty".into()));
        }
        if self.rating.prompt_chars == 0 {
            return Err(PagewatchError::Config("rating.prompt_chars must be positive".into()));
        }
        if self.rating.assistant_poll_secs == 0 {
            return Err(PagewatchError::Config(
                "rating.assistant_poll_secs must be positive".into(),
            ));
        }
        if !(1..=5).contains(&self.notify.min_rating) {
            return Err(PagewatchError::Config(format!(
                "notify.min_rating must be in 1..=5, got {}",
                self.notify.min_rating
            )));
        }
        Ok(())
    }
}

/// Load and parse a TOML config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = FileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.similarity_threshold, 0.9);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.notify.min_rating, 4);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.rating.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\nsimilarity_threshold = 0.75\n\n[storage]\ndata_dir = \"/var/lib/pagewatch\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.monitor.similarity_threshold, 0.75);
        assert_eq!(config.monitor.diff_lines, 20);
        assert_eq!(
            config.storage.analyses_log(),
            PathBuf::from("/var/lib/pagewatch/analyses.jsonl")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\nsimilarity_threshold = \"high\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\nsimilarity = 0.5").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = FileConfig::default();
        config.monitor.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
        config.monitor.similarity_threshold = 0.0;
        assert!(config.validate().is_err());
        config.monitor.similarity_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_attempts_and_bad_min_rating() {
        let mut config = FileConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = FileConfig::default();
        config.notify.min_rating = 6;
        assert!(config.validate().is_err());
    }
}
