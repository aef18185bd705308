//! Consultation request submissions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use site_context_core::{SiteError, SiteResult};

use crate::sqlite_store::{from_millis, to_millis};

/// Form body for a new consultation request. Field names are the wire names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewConsultationRequest {
    pub company_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub current_marketing_stack: Option<String>,
    pub ai_experience: Option<String>,
    pub consultation_type: Option<String>,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub specific_goals: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationRequest {
    pub id: String,
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub current_marketing_stack: Option<String>,
    pub ai_experience: Option<String>,
    pub consultation_type: String,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub specific_goals: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A trimmed, non-blank required field, else `"<field> is required"`.
pub(crate) fn required<'a>(name: &str, value: &'a Option<String>) -> SiteResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SiteError::Validation(format!("{} is required", name)))
}

/// Blank optional strings are stored as NULL.
pub(crate) fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn row_to_request(row: &SqliteRow) -> Result<ConsultationRequest> {
    Ok(ConsultationRequest {
        id: row.get("id"),
        company_name: row.get("company_name"),
        contact_person: row.get("contact_person"),
        email: row.get("email"),
        phone: row.get("phone"),
        company_size: row.get("company_size"),
        industry: row.get("industry"),
        current_marketing_stack: row.get("current_marketing_stack"),
        ai_experience: row.get("ai_experience"),
        consultation_type: row.get("consultation_type"),
        budget_range: row.get("budget_range"),
        timeline: row.get("timeline"),
        specific_goals: row.get("specific_goals"),
        status: row.get("status"),
        created_at: from_millis(row.get("created_at"))?,
    })
}

#[derive(Clone)]
pub struct ConsultationStore {
    pool: SqlitePool,
}

impl ConsultationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate and store a request with status `pending`.
    pub async fn submit(&self, input: &NewConsultationRequest) -> SiteResult<ConsultationRequest> {
        let company_name = required("company_name", &input.company_name)?;
        let contact_person = required("contact_person", &input.contact_person)?;
        let email = required("email", &input.email)?;
        let consultation_type = required("consultation_type", &input.consultation_type)?;

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO consultation_requests (
                id, company_name, contact_person, email, phone, company_size, industry,
                current_marketing_stack, ai_experience, consultation_type, budget_range,
                timeline, specific_goals, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&id)
        .bind(company_name)
        .bind(contact_person)
        .bind(email)
        .bind(optional(&input.phone))
        .bind(optional(&input.company_size))
        .bind(optional(&input.industry))
        .bind(optional(&input.current_marketing_stack))
        .bind(optional(&input.ai_experience))
        .bind(consultation_type)
        .bind(optional(&input.budget_range))
        .bind(optional(&input.timeline))
        .bind(optional(&input.specific_goals))
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        info!(request_id = %id, consultation_type, "consultation request stored");

        let row = sqlx::query("SELECT * FROM consultation_requests WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(row_to_request(&row)?)
    }

    /// All requests, newest first.
    pub async fn list(&self) -> Result<Vec<ConsultationRequest>> {
        let rows =
            sqlx::query("SELECT * FROM consultation_requests ORDER BY created_at DESC, rowid DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_request).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank_and_missing() {
        let err = required("email", &Some("   ".to_string())).unwrap_err();
        assert_eq!(err.to_string(), "email is required");
        assert!(required("phone", &None).is_err());
        assert_eq!(required("company_name", &Some(" Acme ".into())).unwrap(), "Acme");
    }

    #[test]
    fn test_optional_drops_blank() {
        assert_eq!(optional(&Some(" ".into())), None);
        assert_eq!(optional(&Some(" 50-200 ".into())), Some("50-200"));
        assert_eq!(optional(&None), None);
    }
}
