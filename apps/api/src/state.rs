use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::enrichment::Enricher;
use crate::job_board::JobBoard;
use crate::storage::AttachmentStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Pluggable enrichment operations. Default: LlmClient against the Messages API.
    pub llm: Arc<dyn Enricher>,
    /// Pluggable resume storage. Default: S3AttachmentStore against MinIO.
    pub attachments: Arc<dyn AttachmentStore>,
    /// Pluggable job-board client. Default: HttpJobBoard against the ATS board API.
    pub job_board: Arc<dyn JobBoard>,
    pub config: Config,
}
