//! Persisted entity rows. Columns with an LLM- or ATS-owned schema stay
//! JSONB `Value`; columns with a fixed shape (contacts, pay ranges, match
//! sections) are typed and stored through `sqlx::types::Json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::models::webhook::TypedContact;

// Mirrors every column; some are only read back via FromRow.
#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub id: i64,
    /// External ATS candidate identifier; unique, upsert key.
    pub candidate_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub url: Option<String>,
    pub phone_numbers: Json<Vec<TypedContact>>,
    pub email_addresses: Json<Vec<TypedContact>>,
    pub education: Json<Vec<Value>>,
    pub addresses: Json<Vec<Value>>,
    pub tags: Json<Vec<String>>,
    pub custom_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttachmentRow {
    pub id: i64,
    /// Internal candidate id (`candidates.id`).
    pub candidate_id: i64,
    pub filename: String,
    pub url: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    /// Null until the file is uploaded to object storage; set exactly once.
    pub blob_storage_path: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: i64,
    /// External ATS job identifier; unique, shared across applications.
    pub job_id: i64,
    pub title: String,
    pub status: String,
    pub departments: Json<Vec<Value>>,
    pub offices: Json<Vec<Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobContentRow {
    pub id: i64,
    /// External job id; at most one content row per job.
    pub job_id: i64,
    pub internal_job_id: i64,
    pub title: String,
    pub content: String,
    pub absolute_url: Option<String>,
    pub location: Option<String>,
    pub pay_range: Option<Json<PayRange>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pay bands converted from the job board's cents representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayRange {
    pub ranges: Vec<PayBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayBand {
    pub min_value: f64,
    pub max_value: f64,
    pub currency: String,
    pub title: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: i64,
    /// External ATS application identifier; globally unique, never re-created.
    pub application_id: i64,
    pub candidate_id: i64,
    pub job_id: i64,
    pub status: String,
    pub applied_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub source: Option<Value>,
    pub current_stage: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedJdRow {
    pub id: i64,
    pub job_id: i64,
    pub job_content_id: i64,
    pub required_experience: Option<Value>,
    pub required_skills: Option<Value>,
    pub roles_responsibilities: Option<Value>,
    pub required_qualifications: Option<Value>,
    pub required_certifications: Option<Value>,
    pub processing_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedResumeRow {
    pub id: i64,
    pub candidate_id: i64,
    pub attachment_id: i64,
    pub personal_section: Option<Value>,
    pub experience_section: Option<Value>,
    pub skills_section: Option<Value>,
    pub qualification_section: Option<Value>,
    pub project_section: Option<Value>,
    pub certifications: Option<Value>,
    pub company_bg_details: Option<Value>,
    pub processing_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SimilarityScoreRow {
    pub id: i64,
    pub candidate_id: i64,
    pub job_id: i64,
    /// External application id; at most one score per application.
    pub application_id: i64,
    pub processed_resume_id: i64,
    pub processed_jd_id: i64,
    pub overall_score: f64,
    pub match_details: Json<Vec<MatchSection>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One named sub-score from the similarity analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchSection {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub overview: String,
}
