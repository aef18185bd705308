//! Published case studies.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use site_context_core::SiteResult;

use crate::consultations::{optional, required};
use crate::sqlite_store::{from_millis, to_millis};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCaseStudy {
    pub title: Option<String>,
    pub industry: Option<String>,
    pub challenge: Option<String>,
    pub solution: Option<String>,
    pub results: Option<String>,
    pub image_url: Option<String>,
    pub client_name: Option<String>,
    pub project_duration: Option<String>,
    #[serde(default)]
    pub technologies_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseStudy {
    pub id: String,
    pub title: String,
    pub industry: String,
    pub challenge: String,
    pub solution: String,
    pub results: String,
    pub image_url: Option<String>,
    pub client_name: Option<String>,
    pub project_duration: Option<String>,
    pub technologies_used: Vec<String>,
    pub created_at: DateTime<Utc>,
}

fn row_to_case_study(row: &SqliteRow) -> Result<CaseStudy> {
    let technologies: String = row.get("technologies_used_json");
    Ok(CaseStudy {
        id: row.get("id"),
        title: row.get("title"),
        industry: row.get("industry"),
        challenge: row.get("challenge"),
        solution: row.get("solution"),
        results: row.get("results"),
        image_url: row.get("image_url"),
        client_name: row.get("client_name"),
        project_duration: row.get("project_duration"),
        technologies_used: serde_json::from_str(&technologies)?,
        created_at: from_millis(row.get("created_at"))?,
    })
}

#[derive(Clone)]
pub struct CaseStudyStore {
    pool: SqlitePool,
}

impl CaseStudyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: &NewCaseStudy) -> SiteResult<CaseStudy> {
        let title = required("title", &input.title)?;
        let industry = required("industry", &input.industry)?;
        let challenge = required("challenge", &input.challenge)?;
        let solution = required("solution", &input.solution)?;
        let results = required("results", &input.results)?;

        let technologies: Vec<&str> = input
            .technologies_used
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO case_studies (
                id, title, industry, challenge, solution, results, image_url,
                client_name, project_duration, technologies_used_json, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(title)
        .bind(industry)
        .bind(challenge)
        .bind(solution)
        .bind(results)
        .bind(optional(&input.image_url))
        .bind(optional(&input.client_name))
        .bind(optional(&input.project_duration))
        .bind(serde_json::to_string(&technologies).map_err(anyhow::Error::from)?)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        info!(case_study_id = %id, industry, "case study stored");

        let row = sqlx::query("SELECT * FROM case_studies WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(row_to_case_study(&row)?)
    }

    /// All case studies, newest first.
    pub async fn list(&self) -> Result<Vec<CaseStudy>> {
        let rows = sqlx::query("SELECT * FROM case_studies ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_case_study).collect()
    }
}
