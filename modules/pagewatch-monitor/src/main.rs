use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ai_client::OpenAi;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use firecrawl_client::FirecrawlClient;
use pagewatch_common::{load_config, AppConfig, FileConfig, MonitoredSite, Rating};
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pagewatch_monitor::detector::ChangeDetector;
use pagewatch_monitor::fetcher::{DirectFetcher, FallbackFetcher, FirecrawlFetcher, PageFetcher};
use pagewatch_monitor::notify;
use pagewatch_monitor::rating::{AssistantOracle, ChatOracle, PromptBuilder, RatingDispatcher, RatingOracle};
use pagewatch_monitor::recorder::AnalysisRecorder;
use pagewatch_monitor::retry::RetryPolicy;
use pagewatch_monitor::sites::{DualWrite, SiteRegistry};
use pagewatch_monitor::snapshot::FileSnapshotStore;
use pagewatch_monitor::store::{self, JsonSiteStore, JsonlAnalysisLog, PgAnalysisStore, PgSiteStore, SitePatch};
use pagewatch_monitor::summary::{RunProgress, UrlStatus};
use pagewatch_monitor::{Monitor, MonitorParts, MonitorSettings};

#[derive(Parser)]
#[command(name = "pagewatch", about = "Watch web pages for significant changes and rate them")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// TOML config file (overrides PAGEWATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every active site once, or repeatedly with --interval-mins
    Run {
        #[arg(long)]
        interval_mins: Option<u64>,
    },
    /// Manage the watch list
    Sites {
        #[command(subcommand)]
        action: SitesCommand,
    },
    /// Show past analyses, newest first
    History {
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Latest analysis per URL
    LastChecked {
        #[arg(long)]
        json: bool,
    },
    /// Apply database migrations
    Migrate,
}

#[derive(Subcommand)]
enum SitesCommand {
    List {
        /// Include inactive sites
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    Add {
        url: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        category: Option<String>,
    },
    Update {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    Deactivate {
        url: String,
    },
    Activate {
        url: String,
    },
    Remove {
        url: String,
    },
    /// Copy the local site list into the database
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    let mut app = AppConfig::from_env()?;
    if let Some(path) = cli.config {
        app.config_path = path;
    }
    let file = load_config(&app.config_path)?;
    file.validate().context("Invalid configuration")?;

    let pool = match &app.database_url {
        Some(url) => Some(store::connect_lazy(url).context("Invalid DATABASE_URL")?),
        None => {
            warn!("DATABASE_URL not set, using local files only");
            None
        }
    };

    match cli.command {
        Command::Run { interval_mins } => run(&app, &file, pool, interval_mins).await,
        Command::Sites { action } => sites(action, registry(&file, pool.as_ref())).await,
        Command::History { url, limit, json } => {
            let records = recorder(&file, pool.as_ref())
                .history(url.as_deref(), limit)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            for r in records {
                println!(
                    "{}  {:<30} {:<6} {}",
                    r.analyzed_at.format("%Y-%m-%d %H:%M"),
                    r.site_name,
                    r.overall_rating.map(|x| x.to_string()).unwrap_or_else(|| "-".into()),
                    r.explanation.as_deref().or(r.reason.as_deref()).unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::LastChecked { json } => {
            let records = recorder(&file, pool.as_ref()).latest().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            for r in records {
                println!(
                    "{:<50} {}  changed={} rating={}",
                    r.url,
                    r.analyzed_at.format("%Y-%m-%d %H:%M"),
                    r.changes_detected,
                    r.overall_rating.map(|x| x.to_string()).unwrap_or_else(|| "-".into())
                );
            }
            Ok(())
        }
        Command::Migrate => {
            let pool = pool.context("DATABASE_URL is required for migrate")?;
            store::migrate(&pool).await?;
            info!("Migrations applied");
            Ok(())
        }
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("pagewatch=info".parse()?);
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn run(app: &AppConfig, file: &FileConfig, pool: Option<PgPool>, interval_mins: Option<u64>) -> Result<()> {
    if let Some(pool) = &pool {
        if let Err(e) = store::migrate(pool).await {
            warn!(error = %e, "Migrations failed, database may be unreachable");
        }
    }

    let sites = Arc::new(registry(file, pool.as_ref()));
    if let Err(e) = sites.sync_local_to_primary().await {
        warn!(error = %e, "Initial site sync failed");
    }

    let retry = RetryPolicy::from_config(&file.retry);
    let min_rating = Rating::new(i64::from(file.notify.min_rating))?;

    let monitor = Monitor::new(
        MonitorParts {
            sites,
            fetcher: fetcher(app, file, &retry)?,
            snapshots: Arc::new(FileSnapshotStore::new(file.storage.snapshots_dir())),
            detector: ChangeDetector::from_config(&file.monitor),
            rating: RatingDispatcher::new(oracle(app, file), retry, PromptBuilder::from_config(&file.rating)?),
            recorder: Arc::new(recorder(file, pool.as_ref())),
            notifier: Arc::new(notify::from_config(app, file)?),
        },
        MonitorSettings {
            max_concurrent: file.monitor.max_concurrent_urls,
            min_rating,
            runs_dir: Some(file.storage.runs_dir()),
        },
    );

    if let Some(mins) = interval_mins {
        info!(interval_mins = mins, "Running on a schedule");
        monitor.run_every(Duration::from_secs(mins.max(1) * 60)).await;
        return Ok(());
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut total = 0;
        let mut done = 0;
        while let Some(event) = rx.recv().await {
            match event {
                RunProgress::Started { total: n, .. } => total = n,
                RunProgress::UrlFinished { result } => {
                    done += 1;
                    let status = match &result.status {
                        UrlStatus::Recorded { record, .. } => match record.overall_rating {
                            Some(r) => format!("rated {r}"),
                            None => record.reason.clone().unwrap_or_default(),
                        },
                        UrlStatus::FetchFailed { reason, .. } => format!("failed ({reason})"),
                    };
                    println!("[{done}/{total}] {} {status}", result.site_name);
                }
                RunProgress::UrlStarted { .. } | RunProgress::Finished { .. } => {}
            }
        }
    });

    let summary = monitor.run(Some(tx)).await.context("Monitor run failed")?;
    let _ = printer.await;
    println!("{summary}");
    Ok(())
}

fn fetcher(app: &AppConfig, file: &FileConfig, retry: &RetryPolicy) -> Result<Arc<dyn PageFetcher>> {
    let direct = DirectFetcher::new(
        &file.fetch.user_agent,
        file.fetch.timeout(),
        retry.clone(),
        file.monitor.max_content_chars,
    )?;

    let primary: Option<Box<dyn PageFetcher>> = match &app.firecrawl_api_key {
        Some(key) => {
            let client = FirecrawlClient::new(key, file.fetch.timeout())?;
            let firecrawl = FirecrawlFetcher::new(
                client,
                retry.clone(),
                file.fetch.extract_items,
                file.fetch.primary_cooldown(),
                file.monitor.max_content_chars,
            );
            Some(Box::new(firecrawl) as Box<dyn PageFetcher>)
        }
        None => {
            warn!("FIRECRAWL_API_KEY not set, direct fetch only");
            None
        }
    };

    Ok(Arc::new(FallbackFetcher::new(primary, Box::new(direct))))
}

fn oracle(app: &AppConfig, file: &FileConfig) -> Option<Arc<dyn RatingOracle>> {
    let Some(key) = &app.openai_api_key else {
        warn!("OPENAI_API_KEY not set, changed pages will be recorded unrated");
        return None;
    };

    let mut ai = OpenAi::new(key.clone(), file.rating.model.clone());
    if let Some(url) = &app.openai_base_url {
        ai = ai.with_base_url(url.clone());
    }

    let oracle: Arc<dyn RatingOracle> = match &app.openai_assistant_id {
        Some(id) => Arc::new(AssistantOracle::new(
            ai,
            id.clone(),
            file.rating.assistant_poll_interval(),
            file.rating.assistant_timeout(),
        )),
        None => Arc::new(ChatOracle::new(ai)),
    };
    info!(oracle = oracle.name(), model = %file.rating.model, "Rating oracle configured");
    Some(oracle)
}

fn recorder(file: &FileConfig, pool: Option<&PgPool>) -> AnalysisRecorder {
    AnalysisRecorder::new(
        pool.map(|p| Arc::new(PgAnalysisStore::new(p.clone())) as Arc<dyn store::AnalysisStore>),
        Arc::new(JsonlAnalysisLog::new(file.storage.analyses_log())),
    )
}

fn registry(file: &FileConfig, pool: Option<&PgPool>) -> SiteRegistry {
    SiteRegistry::new(
        pool.map(|p| Arc::new(PgSiteStore::new(p.clone())) as Arc<dyn store::SiteStore>),
        Arc::new(JsonSiteStore::new(file.storage.sites_file())),
    )
}

async fn sites(action: SitesCommand, registry: SiteRegistry) -> Result<()> {
    let write = match action {
        SitesCommand::List { all, json } => {
            let sites = registry.list(!all).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sites)?);
            } else {
                for s in sites {
                    let state = if s.active { "active" } else { "inactive" };
                    println!("{:<50} {:<30} {:<12} {state}", s.url, s.name, s.category);
                }
            }
            return Ok(());
        }
        SitesCommand::Add { url, name, category } => {
            let site = MonitoredSite::new(&url, &name, category.as_deref())?;
            registry.add(&site).await?
        }
        SitesCommand::Update { url, name, category } => {
            registry.update(&url, &SitePatch { name, category }).await?
        }
        SitesCommand::Deactivate { url } => registry.set_active(&url, false).await?,
        SitesCommand::Activate { url } => registry.set_active(&url, true).await?,
        SitesCommand::Remove { url } => registry.remove(&url).await?,
        SitesCommand::Sync => {
            let report = registry.sync_local_to_primary().await?;
            println!("synced={} failed={}", report.synced, report.failed);
            return Ok(());
        }
    };

    report_write(&write)
}

fn report_write(write: &DualWrite) -> Result<()> {
    println!("database: {}  local file: {}", write.primary, write.local);
    if !write.succeeded() {
        anyhow::bail!("No store accepted the change");
    }
    Ok(())
}
