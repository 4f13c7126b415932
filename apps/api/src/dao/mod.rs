//! Entity Store. All reads and writes for the eight persisted entities live
//! here; no other module issues SQL.
//!
//! Every mutating operation is a single statement that commits on its own.
//! There is deliberately no cross-entity transaction: a pipeline run that
//! fails mid-way leaves its earlier writes committed, and a rerun of the
//! same webhook is stopped by the application-id dedup gate. Natural-key
//! upserts go through `ON CONFLICT` so concurrent deliveries for the same
//! candidate or job cannot double-insert.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;

use crate::enrichment::{strip_json_fences, SimilarityAnalysis};
use crate::errors::AppError;
use crate::job_board::JobPostContent;
use crate::models::rows::{
    ApplicationRow, AttachmentRow, CandidateRow, JobContentRow, JobRow, MatchSection,
    ProcessedJdRow, ProcessedResumeRow, SimilarityScoreRow,
};
use crate::models::webhook::{
    ApplicationPayload, AttachmentPayload, CandidatePayload, JobPayload, TypedContact,
};

/// Outcome of the application insert: the dedup gate at the heart of the
/// pipeline. `Existing` means another delivery (possibly concurrent) won.
#[derive(Debug)]
pub enum ApplicationInsert {
    Created(ApplicationRow),
    Existing(ApplicationRow),
}

/// Persistence seam for the webhook pipeline, implemented for `PgPool`;
/// pipeline tests substitute an in-memory fake.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Upserts a candidate by external id, updating mutable fields in place
    /// on re-mention.
    async fn upsert_candidate(&self, candidate: &CandidatePayload)
        -> Result<CandidateRow, AppError>;

    /// Adds an attachment, deduped by (candidate, source URL).
    async fn add_attachment(
        &self,
        candidate_id: i64,
        attachment: &AttachmentPayload,
    ) -> Result<AttachmentRow, AppError>;

    /// Records the durable storage path after a confirmed upload and moves
    /// the attachment to `downloaded`. The path transitions from null
    /// exactly once.
    async fn set_attachment_storage_path(
        &self,
        attachment_id: i64,
        storage_path: &str,
    ) -> Result<AttachmentRow, AppError>;

    /// Upserts a job by external job id. Jobs are shared across applications.
    async fn upsert_job(&self, job: &JobPayload) -> Result<JobRow, AppError>;

    /// Upserts the job-post content fetched from the board, keyed by
    /// external job id (at most one content row per job).
    async fn upsert_job_content(
        &self,
        job_id: i64,
        content: &JobPostContent,
    ) -> Result<JobContentRow, AppError>;

    async fn find_application_by_external_id(
        &self,
        application_id: i64,
    ) -> Result<Option<ApplicationRow>, AppError>;

    /// Inserts the application, or reports the existing row untouched. The
    /// unique constraint on the external id makes this at-most-once even
    /// when two deliveries race past the handler's pre-check.
    async fn create_application(
        &self,
        application: &ApplicationPayload,
        candidate_id: i64,
        job_id: i64,
    ) -> Result<ApplicationInsert, AppError>;

    /// Parses the raw JD-formatting output (stripping optional code fences)
    /// and upserts it keyed by (job, job content). A malformed response is a
    /// structured error, never a silently dropped record.
    async fn upsert_processed_jd(
        &self,
        job_id: i64,
        job_content_id: i64,
        raw_llm_text: &str,
    ) -> Result<ProcessedJdRow, AppError>;

    /// Parses the formatted-resume JSON and upserts it keyed by (candidate,
    /// attachment).
    async fn upsert_processed_resume(
        &self,
        candidate_id: i64,
        attachment_id: i64,
        raw_llm_text: &str,
    ) -> Result<ProcessedResumeRow, AppError>;

    /// Upserts the similarity score, keyed by application id: recomputation
    /// overwrites in place, so at most one score exists per application.
    #[allow(clippy::too_many_arguments)]
    async fn upsert_similarity_score(
        &self,
        candidate_id: i64,
        job_id: i64,
        application_id: i64,
        processed_resume_id: i64,
        processed_jd_id: i64,
        analysis: &SimilarityAnalysis,
    ) -> Result<SimilarityScoreRow, AppError>;

    /// Backfills candidate fields from the processed resume; stored custom
    /// fields are merged, not replaced.
    async fn update_candidate_from_resume(
        &self,
        candidate_id: i64,
        formatted: &Value,
    ) -> Result<CandidateRow, AppError>;
}

#[async_trait]
impl EntityStore for PgPool {
    async fn upsert_candidate(
        &self,
        candidate: &CandidatePayload,
    ) -> Result<CandidateRow, AppError> {
        info!(
            "Upserting candidate: {} {}",
            candidate.first_name, candidate.last_name
        );

        let row = sqlx::query_as::<_, CandidateRow>(
            r#"
            INSERT INTO candidates
                (candidate_id, first_name, last_name, title, company, url,
                 phone_numbers, email_addresses, education, addresses, tags, custom_fields)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (candidate_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                title = EXCLUDED.title,
                company = EXCLUDED.company,
                url = EXCLUDED.url,
                phone_numbers = EXCLUDED.phone_numbers,
                email_addresses = EXCLUDED.email_addresses,
                education = EXCLUDED.education,
                addresses = EXCLUDED.addresses,
                tags = EXCLUDED.tags,
                custom_fields = EXCLUDED.custom_fields,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(candidate.id)
        .bind(&candidate.first_name)
        .bind(&candidate.last_name)
        .bind(&candidate.title)
        .bind(&candidate.company)
        .bind(&candidate.url)
        .bind(Json(&candidate.phone_numbers))
        .bind(Json(&candidate.email_addresses))
        .bind(Json(&candidate.educations))
        .bind(Json(&candidate.addresses))
        .bind(Json(&candidate.tags))
        .bind(&candidate.custom_fields)
        .fetch_one(self)
        .await?;

        info!("Candidate upserted with internal id: {}", row.id);
        Ok(row)
    }

    async fn add_attachment(
        &self,
        candidate_id: i64,
        attachment: &AttachmentPayload,
    ) -> Result<AttachmentRow, AppError> {
        info!("Adding attachment for candidate id: {candidate_id}");

        let inserted = sqlx::query_as::<_, AttachmentRow>(
            r#"
            INSERT INTO candidate_attachments (candidate_id, filename, url, type, status)
            VALUES ($1, $2, $3, $4, 'pending')
            ON CONFLICT (candidate_id, url) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .bind(&attachment.filename)
        .bind(&attachment.url)
        .bind(&attachment.kind)
        .fetch_optional(self)
        .await?;

        if let Some(row) = inserted {
            return Ok(row);
        }

        // Lost the insert race or a redelivery: return the existing row.
        let existing = sqlx::query_as::<_, AttachmentRow>(
            "SELECT * FROM candidate_attachments WHERE candidate_id = $1 AND url = $2",
        )
        .bind(candidate_id)
        .bind(&attachment.url)
        .fetch_one(self)
        .await?;

        info!("Attachment already exists for candidate id: {candidate_id}");
        Ok(existing)
    }

    async fn set_attachment_storage_path(
        &self,
        attachment_id: i64,
        storage_path: &str,
    ) -> Result<AttachmentRow, AppError> {
        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            UPDATE candidate_attachments
            SET blob_storage_path = $2, status = 'downloaded'
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(attachment_id)
        .bind(storage_path)
        .fetch_optional(self)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Attachment not found with ID: {attachment_id}"))
        })?;

        info!("Updated storage path for attachment id: {attachment_id}");
        Ok(row)
    }

    async fn upsert_job(&self, job: &JobPayload) -> Result<JobRow, AppError> {
        info!("Upserting job with id: {}", job.id);

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (job_id, title, status, departments, offices)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO UPDATE SET
                title = EXCLUDED.title,
                status = EXCLUDED.status,
                departments = EXCLUDED.departments,
                offices = EXCLUDED.offices,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.status)
        .bind(Json(&job.departments))
        .bind(Json(&job.offices))
        .fetch_one(self)
        .await?;

        Ok(row)
    }

    async fn upsert_job_content(
        &self,
        job_id: i64,
        content: &JobPostContent,
    ) -> Result<JobContentRow, AppError> {
        info!("Upserting job content for job id: {job_id}");

        let row = sqlx::query_as::<_, JobContentRow>(
            r#"
            INSERT INTO job_content
                (job_id, internal_job_id, title, content, absolute_url, location, pay_range, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            ON CONFLICT (job_id) DO UPDATE SET
                internal_job_id = EXCLUDED.internal_job_id,
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                absolute_url = EXCLUDED.absolute_url,
                location = EXCLUDED.location,
                pay_range = EXCLUDED.pay_range,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(content.internal_job_id)
        .bind(&content.title)
        .bind(&content.content)
        .bind(&content.absolute_url)
        .bind(content.location_name())
        .bind(content.pay_range().map(Json))
        .fetch_one(self)
        .await?;

        Ok(row)
    }

    async fn find_application_by_external_id(
        &self,
        application_id: i64,
    ) -> Result<Option<ApplicationRow>, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(self)
        .await?;

        Ok(row)
    }

    async fn create_application(
        &self,
        application: &ApplicationPayload,
        candidate_id: i64,
        job_id: i64,
    ) -> Result<ApplicationInsert, AppError> {
        info!(
            "Adding application {} for candidate id {candidate_id} and job id {job_id}",
            application.id
        );

        let inserted = sqlx::query_as::<_, ApplicationRow>(
            r#"
            INSERT INTO applications
                (application_id, candidate_id, job_id, status, applied_at,
                 last_activity_at, url, source, current_stage)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (application_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(application.id)
        .bind(candidate_id)
        .bind(job_id)
        .bind(&application.status)
        .bind(application.applied_at)
        .bind(application.last_activity_at)
        .bind(&application.url)
        .bind(&application.source)
        .bind(&application.current_stage)
        .fetch_optional(self)
        .await?;

        if let Some(row) = inserted {
            return Ok(ApplicationInsert::Created(row));
        }

        let existing = sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE application_id = $1",
        )
        .bind(application.id)
        .fetch_one(self)
        .await?;

        info!("Application already exists with id: {}", application.id);
        Ok(ApplicationInsert::Existing(existing))
    }

    async fn upsert_processed_jd(
        &self,
        job_id: i64,
        job_content_id: i64,
        raw_llm_text: &str,
    ) -> Result<ProcessedJdRow, AppError> {
        info!("Upserting processed JD for job id: {job_id}");

        let parsed: Value = serde_json::from_str(strip_json_fences(raw_llm_text))
            .map_err(|e| AppError::Llm(format!("Invalid JSON format in formatted JD: {e}")))?;

        let row = sqlx::query_as::<_, ProcessedJdRow>(
            r#"
            INSERT INTO processed_jd
                (job_id, job_content_id, required_experience, required_skills,
                 roles_responsibilities, required_qualifications, required_certifications,
                 processing_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'completed')
            ON CONFLICT (job_id, job_content_id) DO UPDATE SET
                required_experience = EXCLUDED.required_experience,
                required_skills = EXCLUDED.required_skills,
                roles_responsibilities = EXCLUDED.roles_responsibilities,
                required_qualifications = EXCLUDED.required_qualifications,
                required_certifications = EXCLUDED.required_certifications,
                processing_status = 'completed',
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(job_content_id)
        .bind(parsed.get("requiredWorkExperience"))
        .bind(parsed.get("requiredSkills"))
        .bind(parsed.get("rolesAndResponsibilities"))
        .bind(parsed.get("requiredQualifications"))
        .bind(parsed.get("requiredCertifications"))
        .fetch_one(self)
        .await?;

        Ok(row)
    }

    async fn upsert_processed_resume(
        &self,
        candidate_id: i64,
        attachment_id: i64,
        raw_llm_text: &str,
    ) -> Result<ProcessedResumeRow, AppError> {
        info!(
            "Upserting processed resume for candidate id: {candidate_id}, attachment id: {attachment_id}"
        );

        let parsed: Value = serde_json::from_str(strip_json_fences(raw_llm_text))
            .map_err(|e| AppError::Llm(format!("Invalid JSON format in formatted resume: {e}")))?;

        let row = sqlx::query_as::<_, ProcessedResumeRow>(
            r#"
            INSERT INTO processed_resumes
                (candidate_id, attachment_id, personal_section, experience_section,
                 skills_section, qualification_section, project_section, certifications,
                 company_bg_details, processing_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'completed')
            ON CONFLICT (candidate_id, attachment_id) DO UPDATE SET
                personal_section = EXCLUDED.personal_section,
                experience_section = EXCLUDED.experience_section,
                skills_section = EXCLUDED.skills_section,
                qualification_section = EXCLUDED.qualification_section,
                project_section = EXCLUDED.project_section,
                certifications = EXCLUDED.certifications,
                company_bg_details = EXCLUDED.company_bg_details,
                processing_status = 'completed',
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .bind(attachment_id)
        .bind(parsed.get("personalInfo"))
        .bind(parsed.get("workExperience"))
        .bind(parsed.get("skills"))
        .bind(parsed.get("education"))
        .bind(parsed.get("projects"))
        .bind(parsed.get("certifications"))
        .bind(parsed.get("companyBackground"))
        .fetch_one(self)
        .await?;

        Ok(row)
    }

    async fn upsert_similarity_score(
        &self,
        candidate_id: i64,
        job_id: i64,
        application_id: i64,
        processed_resume_id: i64,
        processed_jd_id: i64,
        analysis: &SimilarityAnalysis,
    ) -> Result<SimilarityScoreRow, AppError> {
        info!("Upserting similarity score for application id: {application_id}");

        let row = sqlx::query_as::<_, SimilarityScoreRow>(
            r#"
            INSERT INTO similarity_scores
                (candidate_id, job_id, application_id, processed_resume_id,
                 processed_jd_id, overall_score, match_details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (application_id) DO UPDATE SET
                overall_score = EXCLUDED.overall_score,
                match_details = EXCLUDED.match_details,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .bind(job_id)
        .bind(application_id)
        .bind(processed_resume_id)
        .bind(processed_jd_id)
        .bind(analysis.matching_score)
        .bind(Json(&analysis.sections))
        .fetch_one(self)
        .await?;

        Ok(row)
    }

    async fn update_candidate_from_resume(
        &self,
        candidate_id: i64,
        formatted: &Value,
    ) -> Result<CandidateRow, AppError> {
        info!("Updating candidate {candidate_id} with processed resume data");

        let update = CandidateResumeUpdate::from_formatted_resume(formatted);

        // NULLIF guards rows whose custom_fields hold jsonb null: `||` would
        // turn a non-object operand into an array instead of merging.
        let row = sqlx::query_as::<_, CandidateRow>(
            r#"
            UPDATE candidates SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email_addresses = COALESCE($4, email_addresses),
                phone_numbers = COALESCE($5, phone_numbers),
                addresses = COALESCE($6, addresses),
                title = COALESCE($7, title),
                company = COALESCE($8, company),
                education = COALESCE($9, education),
                tags = COALESCE($10, tags),
                custom_fields = COALESCE(NULLIF(custom_fields, 'null'::jsonb), '{}'::jsonb) || $11,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(update.email_addresses.as_ref().map(Json))
        .bind(update.phone_numbers.as_ref().map(Json))
        .bind(update.addresses.as_ref().map(Json))
        .bind(&update.title)
        .bind(&update.company)
        .bind(update.education.as_ref().map(Json))
        .bind(update.tags.as_ref().map(Json))
        .bind(&update.custom_fields)
        .fetch_optional(self)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate not found with ID: {candidate_id}")))?;

        Ok(row)
    }
}

/// Top similarity scores for a job, ordered by overall score descending.
pub async fn top_scores_for_job(
    pool: &PgPool,
    job_id: i64,
    limit: i64,
) -> Result<Vec<SimilarityScoreRow>, AppError> {
    let rows = sqlx::query_as::<_, SimilarityScoreRow>(
        r#"
        SELECT * FROM similarity_scores
        WHERE job_id = $1
        ORDER BY overall_score DESC
        LIMIT $2
        "#,
    )
    .bind(job_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_candidate(pool: &PgPool, id: i64) -> Result<CandidateRow, AppError> {
    sqlx::query_as::<_, CandidateRow>("SELECT * FROM candidates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No candidate found with ID: {id}")))
}

/// One ranked row of the per-job resume listing: score joined to job title,
/// candidate identity and the resume's company-background narrative.
#[derive(Debug, sqlx::FromRow)]
pub struct RankedResumeRow {
    pub job_title: String,
    pub id: i64,
    pub candidate_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub overall_score: f64,
    pub match_details: Json<Vec<MatchSection>>,
    pub company_bg_details: Option<Value>,
}

/// Fetches all scored resumes for a job. Ordering by overall score is
/// pushed into SQL when requested; sub-metric ranking happens in memory in
/// the query service, so this returns rows in stable insertion order
/// otherwise.
pub async fn scored_resumes_for_job(
    pool: &PgPool,
    job_id: i64,
    order_by_overall: bool,
) -> Result<Vec<RankedResumeRow>, AppError> {
    let base = r#"
        SELECT j.title AS job_title,
               c.id,
               c.candidate_id,
               c.first_name,
               c.last_name,
               s.overall_score,
               s.match_details,
               pr.company_bg_details
        FROM similarity_scores s
        JOIN jobs j ON j.job_id = s.job_id
        JOIN candidates c ON c.id = s.candidate_id
        JOIN processed_resumes pr ON pr.id = s.processed_resume_id
        WHERE s.job_id = $1
        "#;

    let query = if order_by_overall {
        format!("{base} ORDER BY s.overall_score DESC, s.id")
    } else {
        format!("{base} ORDER BY s.id")
    };

    let rows = sqlx::query_as::<_, RankedResumeRow>(&query)
        .bind(job_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Field updates backfilled onto the candidate row from a formatted resume.
/// `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct CandidateResumeUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_addresses: Option<Vec<TypedContact>>,
    pub phone_numbers: Option<Vec<TypedContact>>,
    pub addresses: Option<Vec<Value>>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub education: Option<Vec<Value>>,
    pub tags: Option<Vec<String>>,
    pub custom_fields: Value,
}

impl CandidateResumeUpdate {
    /// Derives the update from the resume formatter's output.
    pub fn from_formatted_resume(formatted: &Value) -> Self {
        let mut update = CandidateResumeUpdate {
            custom_fields: Value::Object(Default::default()),
            ..Default::default()
        };

        let personal = formatted.get("personalInfo");
        if let Some(name) = personal
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            let (first, last) = match name.split_once(' ') {
                Some((first, last)) => (first.to_string(), last.to_string()),
                None => (name.to_string(), String::new()),
            };
            update.first_name = Some(first);
            update.last_name = Some(last);
        }
        if let Some(email) = non_empty_str(personal, "email") {
            update.email_addresses = Some(vec![TypedContact {
                kind: None,
                value: email,
            }]);
        }
        if let Some(phone) = non_empty_str(personal, "phone") {
            update.phone_numbers = Some(vec![TypedContact {
                kind: None,
                value: phone,
            }]);
        }
        if let Some(location) = non_empty_str(personal, "location") {
            update.addresses = Some(vec![Value::String(location)]);
        }

        // Most recent position fills title and company.
        if let Some(latest) = formatted
            .get("workExperience")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
        {
            update.title = latest
                .get("position")
                .and_then(|v| v.as_str())
                .map(String::from);
            update.company = latest
                .get("companyName")
                .and_then(|v| v.as_str())
                .map(String::from);
        }

        if let Some(education) = formatted.get("education").and_then(|v| v.as_array()) {
            let mapped: Vec<Value> = education
                .iter()
                .filter(|edu| {
                    edu.as_object()
                        .is_some_and(|m| m.values().any(|v| !v.is_null()))
                })
                .map(|edu| {
                    serde_json::json!({
                        "degree": edu.get("degree"),
                        "field_of_study": edu.get("field"),
                        "school_name": edu.get("institution"),
                        "graduation_year": edu.get("graduationYear"),
                        "gpa": edu.get("gpa"),
                    })
                })
                .collect();
            if !mapped.is_empty() {
                update.education = Some(mapped);
            }
        }

        if let Some(skills) = formatted.get("skills") {
            let mut all: Vec<String> = Vec::new();
            for group in ["technical", "soft", "languages"] {
                if let Some(arr) = skills.get(group).and_then(|v| v.as_array()) {
                    all.extend(arr.iter().filter_map(|s| s.as_str()).map(String::from));
                }
            }
            all.retain(|s| !s.is_empty());
            if !all.is_empty() {
                update.tags = Some(all);
            }
        }

        let custom = update.custom_fields.as_object_mut().expect("object above");
        for (source_key, target_key) in [
            ("certifications", "certifications"),
            ("projects", "projects"),
            ("companyBackground", "company_background"),
        ] {
            if let Some(value) = formatted.get(source_key).filter(|v| !v.is_null()) {
                custom.insert(target_key.to_string(), value.clone());
            }
        }

        update
    }
}

fn non_empty_str(container: Option<&Value>, key: &str) -> Option<String> {
    container
        .and_then(|c| c.get(key))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
