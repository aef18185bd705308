//! SQLite-backed [`ContextStore`] implementation.
//!
//! Lists and the analysis are stored as JSON text columns; timestamps as
//! Unix milliseconds. State transitions are guarded in SQL
//! (`WHERE status = 'processing'`), so a terminal record can never be
//! rewritten even by two racing pipeline runs.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use site_context_core::models::{ContextPayload, ContextStatus, WebsiteContext};
use site_context_core::store::ContextStore;

/// SQLite implementation of the [`ContextStore`] trait.
#[derive(Clone)]
pub struct SqliteContextStore {
    pool: SqlitePool,
}

impl SqliteContextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("invalid timestamp: {}", ms))
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, url, user_id, status, domain, title, description, content, keywords,
           fetch_method, raw_html_length, search_terms_json, search_results_json,
           analysis_json, error_message, created_at, updated_at
    FROM website_contexts
"#;

fn row_to_context(row: &SqliteRow) -> Result<WebsiteContext> {
    let status: String = row.get("status");
    let fetch_method: Option<String> = row.get("fetch_method");
    let terms_json: String = row.get("search_terms_json");
    let results_json: String = row.get("search_results_json");
    let analysis_json: Option<String> = row.get("analysis_json");

    Ok(WebsiteContext {
        id: row.get("id"),
        url: row.get("url"),
        user_id: row.get("user_id"),
        status: status.parse()?,
        domain: row.get("domain"),
        title: row.get("title"),
        description: row.get("description"),
        content: row.get("content"),
        keywords: row.get("keywords"),
        fetch_method: fetch_method.map(|m| m.parse()).transpose()?,
        raw_html_length: row.get("raw_html_length"),
        search_terms: serde_json::from_str(&terms_json)?,
        search_results: serde_json::from_str(&results_json)?,
        analysis: analysis_json
            .map(|a| serde_json::from_str(&a))
            .transpose()?,
        error_message: row.get("error_message"),
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn find_fresh_completed(
        &self,
        url: &str,
        max_age: Duration,
    ) -> Result<Option<WebsiteContext>> {
        // created_at > now - max_age  <=>  now - created_at < max_age
        let cutoff = to_millis(Utc::now() - max_age);
        let row = sqlx::query(&format!(
            "{} WHERE url = ? AND status = 'completed' AND created_at > ? \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(url)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_context).transpose()
    }

    async fn create_processing(&self, url: &str, user_id: Option<&str>) -> Result<String> {
        let ctx = WebsiteContext::processing(url, user_id);
        sqlx::query(
            r#"
            INSERT INTO website_contexts (id, url, user_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ctx.id)
        .bind(&ctx.url)
        .bind(&ctx.user_id)
        .bind(ctx.status.as_str())
        .bind(to_millis(ctx.created_at))
        .bind(to_millis(ctx.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(ctx.id)
    }

    async fn complete_with(&self, id: &str, payload: &ContextPayload) -> Result<()> {
        let page = &payload.page;
        let result = sqlx::query(
            r#"
            UPDATE website_contexts SET
                status = 'completed',
                domain = ?,
                title = ?,
                description = ?,
                content = ?,
                keywords = ?,
                fetch_method = ?,
                raw_html_length = ?,
                search_terms_json = ?,
                search_results_json = ?,
                analysis_json = ?,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(&page.domain)
        .bind(&page.title)
        .bind(&page.description)
        .bind(&page.content)
        .bind(&page.keywords)
        .bind(page.method.as_str())
        .bind(page.raw_html_length as i64)
        .bind(serde_json::to_string(&payload.search_terms)?)
        .bind(serde_json::to_string(&payload.search_results)?)
        .bind(serde_json::to_string(&payload.analysis)?)
        .bind(to_millis(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("context {} is missing or not processing", id);
        }
        Ok(())
    }

    async fn fail_with(&self, id: &str, message: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE website_contexts SET status = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(ContextStatus::Failed.as_str())
        .bind(message)
        .bind(to_millis(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("context {} is missing or not processing", id);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WebsiteContext>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_context).transpose()
    }
}
