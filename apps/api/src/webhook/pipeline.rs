//! The webhook orchestration pipeline.
//!
//! Strictly sequential stages, each committing its own writes:
//!
//!   dedup gate -> candidate -> attachments -> job -> application
//!   -> job content -> processed JD -> [resume] -> [similarity score]
//!
//! The failure policy is asymmetric by design. Everything through the
//! processed-JD stage is fatal: downstream scoring depends on the JD, so a
//! failure there aborts the request (earlier writes stay committed). The
//! resume and scoring stages are best-effort: their failures are logged and
//! swallowed, and the response still reports the recorded application.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::dao::{ApplicationInsert, EntityStore};
use crate::enrichment::Enricher;
use crate::errors::AppError;
use crate::job_board::JobBoard;
use crate::models::rows::{
    ApplicationRow, AttachmentRow, CandidateRow, ProcessedJdRow, ProcessedResumeRow,
};
use crate::models::webhook::{ApplicationPayload, JobPayload, WebhookEnvelope};
use crate::state::AppState;
use crate::storage::AttachmentStore;

/// What the pipeline managed to record, reported back to the sender.
#[derive(Debug)]
pub struct WebhookOutcome {
    pub candidate_id: i64,
    pub job_id: i64,
    pub application_id: i64,
    pub overall_score: Option<f64>,
}

pub async fn process_webhook(
    state: &AppState,
    envelope: WebhookEnvelope,
) -> Result<WebhookOutcome, AppError> {
    run_pipeline(
        &state.db,
        state.llm.as_ref(),
        state.attachments.as_ref(),
        state.job_board.as_ref(),
        envelope,
    )
    .await
}

async fn run_pipeline(
    store: &dyn EntityStore,
    enricher: &dyn Enricher,
    attachments: &dyn AttachmentStore,
    job_board: &dyn JobBoard,
    envelope: WebhookEnvelope,
) -> Result<WebhookOutcome, AppError> {
    let (application, job_data) = validate_payload(&envelope)?;
    let candidate_data = &application.candidate;

    // Dedup gate: a redelivered application id short-circuits before any
    // write. The unique constraint backs this up under races.
    if let Some(existing) = store.find_application_by_external_id(application.id).await? {
        warn!("Application already exists with ID: {}", application.id);
        return Err(AppError::DuplicateApplication {
            application_id: existing.application_id,
        });
    }

    info!("Processing candidate data");
    let candidate = store.upsert_candidate(candidate_data).await?;

    info!("Processing attachments");
    let mut resume_attachment: Option<AttachmentRow> = None;
    for attachment in &candidate_data.attachments {
        let record = store.add_attachment(candidate.id, attachment).await?;
        if attachment.is_resume() && resume_attachment.is_none() {
            info!("Resume attachment identified: {}", attachment.filename);
            resume_attachment = Some(record);
        }
    }

    info!("Processing job data");
    let job = store.upsert_job(job_data).await?;

    info!("Processing application data");
    let application_record = match store
        .create_application(application, candidate.id, job.job_id)
        .await?
    {
        ApplicationInsert::Created(row) => row,
        // A concurrent delivery won the insert race after our pre-check.
        ApplicationInsert::Existing(row) => {
            warn!("Application already exists with ID: {}", row.application_id);
            return Err(AppError::DuplicateApplication {
                application_id: row.application_id,
            });
        }
    };

    // Job content and JD formatting are fatal: every later stage depends on
    // the processed JD.
    let job_content = job_board
        .fetch_job_content(job.job_id)
        .await
        .map_err(|e| AppError::JobBoard(e.to_string()))?;

    info!("Saving job content");
    let job_content_record = store.upsert_job_content(job.job_id, &job_content).await?;

    info!("Processing job description for job ID: {}", job.job_id);
    let jd_analysis = enricher
        .format_job_description(&job_content_record.content)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;
    let processed_jd = store
        .upsert_processed_jd(job.job_id, job_content_record.id, &jd_analysis)
        .await?;

    // Resume processing is best-effort: the core ATS event (candidate
    // applied to job) is already recorded.
    let mut processed_resume: Option<ProcessedResumeRow> = None;
    if let Some(attachment) = &resume_attachment {
        match process_resume(store, enricher, attachments, &candidate, attachment).await {
            Ok(record) => processed_resume = Some(record),
            Err(e) => error!(
                "Error processing resume for candidate ID {}: {e}",
                candidate.candidate_id
            ),
        }
    } else {
        warn!(
            "No resume attachment found for candidate ID: {}",
            candidate.candidate_id
        );
    }

    // Scoring requires both enrichments; its failure is logged and swallowed.
    let mut overall_score = None;
    if let Some(resume) = &processed_resume {
        match score_application(
            store,
            enricher,
            &candidate,
            job.job_id,
            &application_record,
            resume,
            &processed_jd,
        )
        .await
        {
            Ok(score) => overall_score = Some(score),
            Err(e) => error!(
                "Error calculating similarity scores for application ID {}: {e}",
                application_record.application_id
            ),
        }
    }

    info!(
        "Webhook processed successfully for candidate: {} {}",
        candidate_data.first_name, candidate_data.last_name
    );

    Ok(WebhookOutcome {
        candidate_id: candidate.id,
        job_id: job.job_id,
        application_id: application_record.application_id,
        overall_score,
    })
}

/// The best-effort resume stage: upload to durable storage, extract text,
/// format via the LLM, persist, and backfill the candidate row.
async fn process_resume(
    store: &dyn EntityStore,
    enricher: &dyn Enricher,
    attachments: &dyn AttachmentStore,
    candidate: &CandidateRow,
    attachment: &AttachmentRow,
) -> Result<ProcessedResumeRow, AppError> {
    info!("Processing resume for candidate ID: {}", candidate.candidate_id);

    let stored = attachments
        .store_resume(&attachment.filename, &attachment.url)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

    store
        .set_attachment_storage_path(attachment.id, &stored.storage_path)
        .await?;

    let mut formatted = enricher
        .format_resume(&stored.text)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?
        .ok_or_else(|| AppError::Llm("Failed to format resume".to_string()))?;

    // Company background enriches the formatted resume but is not worth
    // failing the stage over.
    match enricher.company_background(&formatted).await {
        Ok(Some(background)) => {
            if let Some(map) = formatted.as_object_mut() {
                map.insert("companyBackground".to_string(), Value::String(background));
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Error generating company background: {e}"),
    }

    let raw = serde_json::to_string(&formatted)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serializing formatted resume: {e}")))?;
    let record = store
        .upsert_processed_resume(candidate.id, attachment.id, &raw)
        .await?;

    if let Err(e) = store.update_candidate_from_resume(candidate.id, &formatted).await {
        warn!(
            "Error backfilling candidate {} from resume: {e}",
            candidate.candidate_id
        );
    }

    Ok(record)
}

/// Assembles the two structured documents and records the similarity score.
async fn score_application(
    store: &dyn EntityStore,
    enricher: &dyn Enricher,
    candidate: &CandidateRow,
    job_id: i64,
    application: &ApplicationRow,
    resume: &ProcessedResumeRow,
    jd: &ProcessedJdRow,
) -> Result<f64, AppError> {
    info!("Calculating similarity scores");

    let resume_sections = serde_json::json!({
        "experience": resume.experience_section,
        "skills": resume.skills_section,
        "qualifications": resume.qualification_section,
        "projects": resume.project_section,
        "certifications": resume.certifications,
    });
    let jd_sections = serde_json::json!({
        "required_experience": jd.required_experience,
        "required_skills": jd.required_skills,
        "roles_responsibilities": jd.roles_responsibilities,
        "required_qualifications": jd.required_qualifications,
        "required_certifications": jd.required_certifications,
    });

    let analysis = enricher
        .score_similarity(&resume_sections, &jd_sections, application.application_id)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let record = store
        .upsert_similarity_score(
            candidate.id,
            job_id,
            application.application_id,
            resume.id,
            jd.id,
            &analysis,
        )
        .await?;

    info!(
        "Successfully processed similarity scores. Overall score: {}",
        record.overall_score
    );
    Ok(record.overall_score)
}

/// Extracts the application and its primary job from the envelope. Split
/// out so payload-shape rules are testable on their own.
pub fn validate_payload(
    envelope: &WebhookEnvelope,
) -> Result<(&ApplicationPayload, &JobPayload), AppError> {
    let application = &envelope.payload.application;
    let job = application
        .primary_job()
        .ok_or_else(|| AppError::Validation("Webhook payload carries no jobs".to_string()))?;
    Ok((application, job))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::types::Json;

    use super::*;
    use crate::enrichment::{EnrichmentError, SimilarityAnalysis};
    use crate::job_board::{JobBoardError, JobPostContent};
    use crate::models::rows::{JobContentRow, JobRow, SimilarityScoreRow};
    use crate::models::webhook::{AttachmentPayload, CandidatePayload};
    use crate::storage::{StorageError, StoredAttachment};

    fn envelope(jobs: serde_json::Value) -> WebhookEnvelope {
        serde_json::from_value(serde_json::json!({
            "payload": {
                "application": {
                    "id": 555,
                    "status": "active",
                    "applied_at": "2024-03-01T10:00:00Z",
                    "candidate": {
                        "id": 1,
                        "first_name": "A",
                        "last_name": "B",
                        "attachments": [
                            {"type": "resume", "filename": "r.pdf", "url": "https://x/r.pdf"}
                        ]
                    },
                    "jobs": jobs
                }
            }
        }))
        .unwrap()
    }

    fn scenario_envelope() -> WebhookEnvelope {
        envelope(serde_json::json!([
            {"id": 42, "name": "Engineer", "status": "open"}
        ]))
    }

    fn candidate_row(external_id: i64) -> CandidateRow {
        CandidateRow {
            id: 7,
            candidate_id: external_id,
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            title: None,
            company: None,
            url: None,
            phone_numbers: Json(vec![]),
            email_addresses: Json(vec![]),
            education: Json(vec![]),
            addresses: Json(vec![]),
            tags: Json(vec![]),
            custom_fields: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn attachment_row(candidate_id: i64, attachment: &AttachmentPayload) -> AttachmentRow {
        AttachmentRow {
            id: 10,
            candidate_id,
            filename: attachment.filename.clone(),
            url: attachment.url.clone(),
            kind: attachment.kind.clone(),
            blob_storage_path: None,
            status: "pending".to_string(),
            created_at: Utc::now(),
        }
    }

    fn application_row(external_id: i64) -> ApplicationRow {
        ApplicationRow {
            id: 4,
            application_id: external_id,
            candidate_id: 7,
            job_id: 42,
            status: "active".to_string(),
            applied_at: Utc::now(),
            last_activity_at: None,
            url: None,
            source: None,
            current_stage: None,
            created_at: Utc::now(),
        }
    }

    /// In-memory store recording which entity kinds were written.
    #[derive(Default)]
    struct FakeStore {
        existing_application: Option<i64>,
        writes: Mutex<Vec<&'static str>>,
    }

    impl FakeStore {
        fn record(&self, kind: &'static str) {
            self.writes.lock().unwrap().push(kind);
        }

        fn wrote(&self, kind: &str) -> bool {
            self.writes.lock().unwrap().iter().any(|w| *w == kind)
        }
    }

    #[async_trait]
    impl EntityStore for FakeStore {
        async fn upsert_candidate(
            &self,
            candidate: &CandidatePayload,
        ) -> Result<CandidateRow, AppError> {
            self.record("candidate");
            Ok(candidate_row(candidate.id))
        }

        async fn add_attachment(
            &self,
            candidate_id: i64,
            attachment: &AttachmentPayload,
        ) -> Result<AttachmentRow, AppError> {
            self.record("attachment");
            Ok(attachment_row(candidate_id, attachment))
        }

        async fn set_attachment_storage_path(
            &self,
            _attachment_id: i64,
            storage_path: &str,
        ) -> Result<AttachmentRow, AppError> {
            self.record("storage_path");
            let mut row = attachment_row(
                7,
                &AttachmentPayload {
                    filename: "r.pdf".to_string(),
                    url: "https://x/r.pdf".to_string(),
                    kind: "resume".to_string(),
                },
            );
            row.blob_storage_path = Some(storage_path.to_string());
            row.status = "downloaded".to_string();
            Ok(row)
        }

        async fn upsert_job(&self, job: &JobPayload) -> Result<JobRow, AppError> {
            self.record("job");
            Ok(JobRow {
                id: 2,
                job_id: job.id,
                title: job.name.clone(),
                status: job.status.clone(),
                departments: Json(vec![]),
                offices: Json(vec![]),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn upsert_job_content(
            &self,
            job_id: i64,
            content: &JobPostContent,
        ) -> Result<JobContentRow, AppError> {
            self.record("job_content");
            Ok(JobContentRow {
                id: 3,
                job_id,
                internal_job_id: content.internal_job_id,
                title: content.title.clone(),
                content: content.content.clone(),
                absolute_url: None,
                location: None,
                pay_range: None,
                status: "pending".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn find_application_by_external_id(
            &self,
            application_id: i64,
        ) -> Result<Option<ApplicationRow>, AppError> {
            Ok(self
                .existing_application
                .filter(|id| *id == application_id)
                .map(application_row))
        }

        async fn create_application(
            &self,
            application: &ApplicationPayload,
            _candidate_id: i64,
            _job_id: i64,
        ) -> Result<ApplicationInsert, AppError> {
            self.record("application");
            Ok(ApplicationInsert::Created(application_row(application.id)))
        }

        async fn upsert_processed_jd(
            &self,
            job_id: i64,
            job_content_id: i64,
            raw_llm_text: &str,
        ) -> Result<ProcessedJdRow, AppError> {
            let parsed: Value = serde_json::from_str(raw_llm_text)
                .map_err(|e| AppError::Llm(format!("Invalid JSON format in formatted JD: {e}")))?;
            self.record("processed_jd");
            Ok(ProcessedJdRow {
                id: 5,
                job_id,
                job_content_id,
                required_experience: None,
                required_skills: parsed.get("requiredSkills").cloned(),
                roles_responsibilities: None,
                required_qualifications: None,
                required_certifications: None,
                processing_status: "completed".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn upsert_processed_resume(
            &self,
            candidate_id: i64,
            attachment_id: i64,
            _raw_llm_text: &str,
        ) -> Result<ProcessedResumeRow, AppError> {
            self.record("processed_resume");
            Ok(ProcessedResumeRow {
                id: 6,
                candidate_id,
                attachment_id,
                personal_section: None,
                experience_section: None,
                skills_section: None,
                qualification_section: None,
                project_section: None,
                certifications: None,
                company_bg_details: None,
                processing_status: "completed".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
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
            self.record("similarity_score");
            Ok(SimilarityScoreRow {
                id: 8,
                candidate_id,
                job_id,
                application_id,
                processed_resume_id,
                processed_jd_id,
                overall_score: analysis.matching_score,
                match_details: Json(analysis.sections.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn update_candidate_from_resume(
            &self,
            candidate_id: i64,
            _formatted: &Value,
        ) -> Result<CandidateRow, AppError> {
            self.record("candidate_backfill");
            Ok(candidate_row(candidate_id))
        }
    }

    #[derive(Default)]
    struct FakeEnricher {
        fail_jd: bool,
        fail_resume: bool,
        fail_score: bool,
    }

    #[async_trait]
    impl Enricher for FakeEnricher {
        async fn format_job_description(&self, _jd_text: &str) -> Result<String, EnrichmentError> {
            if self.fail_jd {
                return Err(EnrichmentError::EmptyContent);
            }
            Ok(r#"{"requiredSkills": ["Rust"]}"#.to_string())
        }

        async fn format_resume(
            &self,
            _resume_text: &str,
        ) -> Result<Option<Value>, EnrichmentError> {
            if self.fail_resume {
                return Err(EnrichmentError::EmptyContent);
            }
            Ok(Some(serde_json::json!({
                "personalInfo": {"name": "A B"},
                "workExperience": []
            })))
        }

        async fn company_background(
            &self,
            _formatted_resume: &Value,
        ) -> Result<Option<String>, EnrichmentError> {
            Ok(None)
        }

        async fn score_similarity(
            &self,
            _resume_sections: &Value,
            _jd_sections: &Value,
            _application_id: i64,
        ) -> Result<SimilarityAnalysis, EnrichmentError> {
            if self.fail_score {
                return Err(EnrichmentError::EmptyContent);
            }
            Ok(SimilarityAnalysis {
                matching_score: 72.0,
                sections: vec![],
                potential_gaps: vec![],
            })
        }
    }

    struct FakeAttachments;

    #[async_trait]
    impl AttachmentStore for FakeAttachments {
        async fn store_resume(
            &self,
            filename: &str,
            _source_url: &str,
        ) -> Result<StoredAttachment, StorageError> {
            Ok(StoredAttachment {
                storage_path: format!("http://s3/resumes/{filename}"),
                text: "resume text".to_string(),
            })
        }
    }

    struct FakeBoard;

    #[async_trait]
    impl JobBoard for FakeBoard {
        async fn fetch_job_content(&self, job_id: i64) -> Result<JobPostContent, JobBoardError> {
            Ok(JobPostContent {
                internal_job_id: job_id + 9000,
                title: "Engineer".to_string(),
                content: "We need an engineer.".to_string(),
                absolute_url: None,
                location: None,
                pay_input_ranges: vec![],
            })
        }
    }

    #[test]
    fn test_validate_payload_requires_a_job() {
        let envelope = envelope(serde_json::json!([]));
        assert!(matches!(
            validate_payload(&envelope),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_payload_accepts_first_job() {
        let envelope = envelope(serde_json::json!([
            {"id": 42, "name": "Engineer", "status": "open"},
            {"id": 43, "name": "Other", "status": "open"}
        ]));
        let (application, job) = validate_payload(&envelope).unwrap();
        assert_eq!(application.id, 555);
        assert_eq!(job.id, 42);
    }

    #[tokio::test]
    async fn test_full_run_records_score() {
        let store = FakeStore::default();
        let outcome = run_pipeline(
            &store,
            &FakeEnricher::default(),
            &FakeAttachments,
            &FakeBoard,
            scenario_envelope(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.application_id, 555);
        assert_eq!(outcome.job_id, 42);
        assert_eq!(outcome.overall_score, Some(72.0));
        assert!(store.wrote("storage_path"));
        assert!(store.wrote("processed_resume"));
        assert!(store.wrote("similarity_score"));
    }

    #[tokio::test]
    async fn test_jd_failure_is_fatal_and_keeps_earlier_writes() {
        let store = FakeStore::default();
        let enricher = FakeEnricher {
            fail_jd: true,
            ..Default::default()
        };

        let err = run_pipeline(
            &store,
            &enricher,
            &FakeAttachments,
            &FakeBoard,
            scenario_envelope(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Llm(_)));
        // Candidate/job/application rows are already committed.
        assert!(store.wrote("candidate"));
        assert!(store.wrote("application"));
        assert!(!store.wrote("processed_jd"));
        assert!(!store.wrote("processed_resume"));
        assert!(!store.wrote("similarity_score"));
    }

    #[tokio::test]
    async fn test_resume_failure_is_swallowed_without_score() {
        let store = FakeStore::default();
        let enricher = FakeEnricher {
            fail_resume: true,
            ..Default::default()
        };

        let outcome = run_pipeline(
            &store,
            &enricher,
            &FakeAttachments,
            &FakeBoard,
            scenario_envelope(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.overall_score, None);
        assert!(store.wrote("processed_jd"));
        assert!(!store.wrote("processed_resume"));
        assert!(!store.wrote("similarity_score"));
    }

    #[tokio::test]
    async fn test_score_failure_is_swallowed() {
        let store = FakeStore::default();
        let enricher = FakeEnricher {
            fail_score: true,
            ..Default::default()
        };

        let outcome = run_pipeline(
            &store,
            &enricher,
            &FakeAttachments,
            &FakeBoard,
            scenario_envelope(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.overall_score, None);
        assert!(store.wrote("processed_resume"));
        assert!(!store.wrote("similarity_score"));
    }

    #[tokio::test]
    async fn test_duplicate_application_short_circuits_before_writes() {
        let store = FakeStore {
            existing_application: Some(555),
            ..Default::default()
        };

        let err = run_pipeline(
            &store,
            &FakeEnricher::default(),
            &FakeAttachments,
            &FakeBoard,
            scenario_envelope(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::DuplicateApplication {
                application_id: 555
            }
        ));
        assert!(!store.wrote("candidate"));
        assert!(!store.wrote("application"));
    }
}
