// Postgres persistence for sites and analyses.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagewatch_common::{AnalysisRecord, MonitoredSite, NewsItem, Rating};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AnalysisStore, SitePatch, SiteStore};
use crate::error::StoreError;

/// Unreachable databases should fail fast so the run can fall back.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a pool without connecting; connection errors surface per query.
pub fn connect_lazy(database_url: &str) -> Result<PgPool, StoreError> {
    Ok(PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy(database_url)?)
}

/// Run the embedded SQL migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == "23505")
}

fn rating(value: i16, what: &str) -> Result<Rating, StoreError> {
    Rating::new(value as i64).map_err(|e| StoreError::Corrupt(format!("{what}: {e}")))
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

pub struct PgAnalysisStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct AnalysisRow {
    id: Uuid,
    run_id: Uuid,
    url: String,
    site_name: String,
    overall_rating: Option<i16>,
    explanation: Option<String>,
    changes_detected: bool,
    reason: Option<String>,
    similarity: Option<f64>,
    fetcher: Option<String>,
    analyzed_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct NewsItemRow {
    analysis_id: Uuid,
    title: String,
    date: Option<String>,
    rating: i16,
    content: String,
}

const ANALYSIS_COLUMNS: &str = "id, run_id, url, site_name, overall_rating, explanation, \
     changes_detected, reason, similarity, fetcher, analyzed_at";

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach news items to analysis rows, preserving row order.
    async fn hydrate(&self, rows: Vec<AnalysisRow>) -> Result<Vec<AnalysisRecord>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, NewsItemRow>(
            r#"
            SELECT analysis_id, title, date, rating, content
            FROM news_items
            WHERE analysis_id = ANY($1)
            ORDER BY analysis_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_analysis: HashMap<Uuid, Vec<NewsItem>> = HashMap::new();
        for item in items {
            by_analysis.entry(item.analysis_id).or_default().push(NewsItem {
                rating: rating(item.rating, "news item rating")?,
                title: item.title,
                date: item.date,
                content: item.content,
            });
        }

        rows.into_iter()
            .map(|row| {
                Ok(AnalysisRecord {
                    overall_rating: row
                        .overall_rating
                        .map(|r| rating(r, "overall rating"))
                        .transpose()?,
                    items: by_analysis.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    run_id: row.run_id,
                    url: row.url,
                    site_name: row.site_name,
                    explanation: row.explanation,
                    changes_detected: row.changes_detected,
                    reason: row.reason,
                    similarity: row.similarity,
                    fetcher: row.fetcher,
                    analyzed_at: row.analyzed_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, run_id, url, site_name, overall_rating, explanation,
                 changes_detected, reason, similarity, fetcher, analyzed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.run_id)
        .bind(&record.url)
        .bind(&record.site_name)
        .bind(record.overall_rating.map(i16::from))
        .bind(&record.explanation)
        .bind(record.changes_detected)
        .bind(&record.reason)
        .bind(record.similarity)
        .bind(&record.fetcher)
        .bind(record.analyzed_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in record.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO news_items (analysis_id, position, title, date, rating, content)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(position as i32)
            .bind(&item.title)
            .bind(&item.date)
            .bind(i16::from(item.rating))
            .bind(&item.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM analyses ORDER BY analyzed_at DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn for_url(&self, url: &str, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE url = $1 \
             ORDER BY analyzed_at DESC LIMIT $2"
        ))
        .bind(url)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn latest_per_url(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "SELECT DISTINCT ON (url) {ANALYSIS_COLUMNS} FROM analyses \
             ORDER BY url, analyzed_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

pub struct PgSiteStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SiteRow {
    url: String,
    name: String,
    category: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<SiteRow> for MonitoredSite {
    fn from(row: SiteRow) -> Self {
        Self {
            url: row.url,
            name: row.name,
            category: row.category,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

impl PgSiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn expect_one(url: &str, rows_affected: u64) -> Result<(), StoreError> {
        if rows_affected == 0 {
            Err(StoreError::NotFound(url.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SiteStore for PgSiteStore {
    async fn list(&self, active_only: bool) -> Result<Vec<MonitoredSite>, StoreError> {
        let rows = sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT url, name, category, active, created_at
            FROM monitored_sites
            WHERE active OR NOT $1
            ORDER BY created_at, url
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MonitoredSite::from).collect())
    }

    async fn add(&self, site: &MonitoredSite) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO monitored_sites (url, name, category, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&site.url)
        .bind(&site.name)
        .bind(&site.category)
        .bind(site.active)
        .bind(site.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(site.url.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, site: &MonitoredSite) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO monitored_sites (url, name, category, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (url) DO UPDATE
                SET name = EXCLUDED.name,
                    category = EXCLUDED.category,
                    active = EXCLUDED.active
            "#,
        )
        .bind(&site.url)
        .bind(&site.name)
        .bind(&site.category)
        .bind(site.active)
        .bind(site.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, url: &str, patch: &SitePatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE monitored_sites
            SET name = COALESCE($2, name),
                category = COALESCE($3, category)
            WHERE url = $1
            "#,
        )
        .bind(url)
        .bind(&patch.name)
        .bind(&patch.category)
        .execute(&self.pool)
        .await?;
        Self::expect_one(url, result.rows_affected())
    }

    async fn set_active(&self, url: &str, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE monitored_sites SET active = $2 WHERE url = $1")
            .bind(url)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Self::expect_one(url, result.rows_affected())
    }

    async fn remove(&self, url: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM monitored_sites WHERE url = $1")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Self::expect_one(url, result.rows_affected())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
