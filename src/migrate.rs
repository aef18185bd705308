//! Schema migrations.
//!
//! Every statement is idempotent (`CREATE ... IF NOT EXISTS`), so
//! `sitectx init` can run any number of times.
//!
//! | Table | Contents |
//! |-------|----------|
//! | `website_contexts` | Analysis records and their lifecycle state |
//! | `leads` | Captured leads, unique on `email` |
//! | `consultation_requests` | Consultation form submissions |
//! | `case_studies` | Published case studies |
//!
//! Timestamps are stored as Unix milliseconds; list/JSON columns as JSON text.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an already-open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS website_contexts (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            user_id TEXT,
            status TEXT NOT NULL CHECK (status IN ('processing', 'completed', 'failed')),
            domain TEXT,
            title TEXT,
            description TEXT,
            content TEXT,
            keywords TEXT,
            fetch_method TEXT,
            raw_html_length INTEGER,
            search_terms_json TEXT NOT NULL DEFAULT '[]',
            search_results_json TEXT NOT NULL DEFAULT '[]',
            analysis_json TEXT,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cache lookups filter on url + status and order by created_at.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_website_contexts_url ON website_contexts(url, status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            website_domain TEXT NOT NULL,
            website_url TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            conversation_id TEXT,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consultation_requests (
            id TEXT PRIMARY KEY,
            company_name TEXT NOT NULL,
            contact_person TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            company_size TEXT,
            industry TEXT,
            current_marketing_stack TEXT,
            ai_experience TEXT,
            consultation_type TEXT NOT NULL,
            budget_range TEXT,
            timeline TEXT,
            specific_goals TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_studies (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            industry TEXT NOT NULL,
            challenge TEXT NOT NULL,
            solution TEXT NOT NULL,
            results TEXT NOT NULL,
            image_url TEXT,
            client_name TEXT,
            project_duration TEXT,
            technologies_used_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
