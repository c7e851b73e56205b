use std::path::PathBuf;

use anyhow::Result;

/// Secrets and endpoints loaded from environment variables.
/// Everything tunable lives in the TOML `FileConfig`.
#[derive(Clone, Default)]
pub struct AppConfig {
    // Database (absent means local files only)
    pub database_url: Option<String>,

    // Rating oracle
    pub openai_api_key: Option<String>,
    pub openai_assistant_id: Option<String>,
    pub openai_base_url: Option<String>,

    // Scraping
    pub firecrawl_api_key: Option<String>,

    // Notifications
    pub slack_webhook_url: Option<String>,
    pub resend_api_key: Option<String>,
    pub notify_email_from: Option<String>,
    pub notify_email_to: Vec<String>,

    pub config_path: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url.is_some())
            .field("openai_assistant_id", &self.openai_assistant_id)
            .field("openai_base_url", &self.openai_base_url)
            .field("notify_email_to", &self.notify_email_to)
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: non_empty_env("DATABASE_URL"),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_assistant_id: non_empty_env("OPENAI_ASSISTANT_ID"),
            openai_base_url: non_empty_env("OPENAI_BASE_URL"),
            firecrawl_api_key: non_empty_env("FIRECRAWL_API_KEY"),
            slack_webhook_url: non_empty_env("SLACK_WEBHOOK_URL"),
            resend_api_key: non_empty_env("RESEND_API_KEY"),
            notify_email_from: non_empty_env("NOTIFY_EMAIL_FROM"),
            notify_email_to: std::env::var("NOTIFY_EMAIL_TO")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            config_path: non_empty_env("PAGEWATCH_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("pagewatch.toml")),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", if self.database_url.is_some() { "<set>" } else { "<not set>" });
        tracing::info!("  OPENAI_API_KEY: {}", preview_opt(&self.openai_api_key));
        tracing::info!("  OPENAI_ASSISTANT_ID: {}", preview_opt(&self.openai_assistant_id));
        tracing::info!("  FIRECRAWL_API_KEY: {}", preview_opt(&self.firecrawl_api_key));
        tracing::info!("  SLACK_WEBHOOK_URL: {}", preview_opt(&self.slack_webhook_url));
        tracing::info!("  RESEND_API_KEY: {}", preview_opt(&self.resend_api_key));
        tracing::info!("  PAGEWATCH_CONFIG: {}", self.config_path.display());
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
