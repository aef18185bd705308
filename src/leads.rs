//! Lead capture and management.
//!
//! Leads are collected from the chat widget: a website plus an email
//! address. The `email` column is unique; submitting an address that
//! already exists refreshes that row in place and reports `isUpdate = true`
//! instead of failing.
//!
//! | Operation | Errors |
//! |-----------|--------|
//! | [`LeadStore::create`] | `Validation` (bad email / website) |
//! | [`LeadStore::update_status`] | `Validation` (bad status), `NotFound` |
//! | [`LeadStore::list`] | store only |
//! | [`LeadStore::stats`] | store only |

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use site_context_core::normalize::normalize_url;
use site_context_core::{SiteError, SiteResult};

use crate::sqlite_store::{from_millis, to_millis};

/// Source recorded for every lead created through this API.
pub const LEAD_SOURCE: &str = "chat_widget";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern should compile")
});

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Closed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Converted,
        LeadStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| SiteError::Validation("Invalid status".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub website_domain: String,
    pub website_url: String,
    pub email: String,
    pub conversation_id: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request details captured alongside a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub user_agent: String,
    pub ip: String,
    pub referer: String,
    pub accept_language: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub website: String,
    pub email: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedLead {
    pub lead: Lead,
    pub is_update: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilters {
    pub email: Option<String>,
    pub domain: Option<String>,
    pub status: Option<String>,
    pub conversation_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub total: usize,
    pub new: usize,
    pub contacted: usize,
    pub qualified: usize,
    pub converted: usize,
    pub closed: usize,
    pub recent_leads: Vec<Lead>,
}

const RECENT_LEADS: usize = 10;

const SELECT_LEADS: &str = r#"
    SELECT id, website_domain, website_url, email, conversation_id, source, status,
           metadata_json, created_at, updated_at
    FROM leads
"#;

fn row_to_lead(row: &SqliteRow) -> Result<Lead> {
    let status: String = row.get("status");
    let metadata: String = row.get("metadata_json");
    Ok(Lead {
        id: row.get("id"),
        website_domain: row.get("website_domain"),
        website_url: row.get("website_url"),
        email: row.get("email"),
        conversation_id: row.get("conversation_id"),
        source: row.get("source"),
        status: status.parse()?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}

fn metadata_json(meta: &RequestMetadata, stamp_key: &str, now: DateTime<Utc>) -> Result<String> {
    let mut map = match serde_json::to_value(meta)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert(stamp_key.to_string(), Value::String(now.to_rfc3339()));
    Ok(Value::Object(map).to_string())
}

#[derive(Clone)]
pub struct LeadStore {
    pool: SqlitePool,
}

impl LeadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a lead, or refresh the existing row with the same email.
    pub async fn create(&self, input: &NewLead, meta: &RequestMetadata) -> SiteResult<CreatedLead> {
        if input.website.trim().is_empty() || input.email.trim().is_empty() {
            return Err(SiteError::Validation(
                "Website and email are required".into(),
            ));
        }

        let email = input.email.trim().to_lowercase();
        if !validate_email(&email) {
            return Err(SiteError::Validation("Invalid email format".into()));
        }
        let website = normalize_url(&input.website)
            .map_err(|_| SiteError::Validation("Invalid website URL format".into()))?;
        let conversation_id = input
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        // Single-statement upsert; the row id tells insert from update.
        let now = Utc::now();
        let new_id = Uuid::new_v4().to_string();
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO leads (id, website_domain, website_url, email, conversation_id,
                               source, status, metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                website_domain = excluded.website_domain,
                website_url = excluded.website_url,
                conversation_id = excluded.conversation_id,
                metadata_json = ?,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&new_id)
        .bind(&website.domain)
        .bind(&website.url)
        .bind(&email)
        .bind(conversation_id)
        .bind(LEAD_SOURCE)
        .bind(LeadStatus::New.as_str())
        .bind(metadata_json(meta, "createdAt", now)?)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .bind(metadata_json(meta, "updatedAt", now)?)
        .fetch_one(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        let is_update = id != new_id;

        let lead = self.require(&id).await?;
        info!(lead_id = %lead.id, domain = %lead.website_domain, is_update, "lead saved");
        Ok(CreatedLead { lead, is_update })
    }

    pub async fn update_status(&self, id: &str, status: &str) -> SiteResult<Lead> {
        if id.trim().is_empty() || status.trim().is_empty() {
            return Err(SiteError::Validation(
                "Lead ID and status are required".into(),
            ));
        }
        let status: LeadStatus = status.parse()?;

        let result = sqlx::query("UPDATE leads SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_millis(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

        if result.rows_affected() == 0 {
            return Err(SiteError::NotFound("Lead not found".into()));
        }
        self.require(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Lead>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_LEADS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_lead).transpose()
    }

    async fn require(&self, id: &str) -> SiteResult<Lead> {
        self.get(id)
            .await?
            .ok_or_else(|| SiteError::NotFound("Lead not found".into()))
    }

    /// Leads matching every given filter, newest first.
    pub async fn list(&self, filters: &LeadFilters) -> Result<Vec<Lead>> {
        let mut clauses = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(email) = non_blank(&filters.email) {
            clauses.push("email = ?");
            binds.push(email.to_lowercase());
        }
        if let Some(domain) = non_blank(&filters.domain) {
            clauses.push("website_domain = ?");
            binds.push(domain.to_string());
        }
        if let Some(status) = non_blank(&filters.status) {
            clauses.push("status = ?");
            binds.push(status.to_string());
        }
        if let Some(conversation_id) = non_blank(&filters.conversation_id) {
            clauses.push("conversation_id = ?");
            binds.push(conversation_id.to_string());
        }

        let mut sql = SELECT_LEADS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filters.limit.filter(|l| *l > 0) {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_lead).collect()
    }

    pub async fn stats(&self) -> Result<LeadStats> {
        let all = self.list(&LeadFilters::default()).await?;
        let count = |status: LeadStatus| all.iter().filter(|l| l.status == status).count();

        Ok(LeadStats {
            total: all.len(),
            new: count(LeadStatus::New),
            contacted: count(LeadStatus::Contacted),
            qualified: count(LeadStatus::Qualified),
            converted: count(LeadStatus::Converted),
            closed: count(LeadStatus::Closed),
            recent_leads: all.iter().take(RECENT_LEADS).cloned().collect(),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
