pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::jobs::handlers as job_handlers;
use crate::state::AppState;
use crate::webhook::handlers as webhook_handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // ATS webhook ingestion
        .route(
            "/simulate_webhook",
            post(webhook_handlers::handle_webhook),
        )
        // Ranked-resumes query API
        .route(
            "/jobs/:job_id/resumes",
            get(job_handlers::ranked_resumes),
        )
        .route("/top-resumes/:job_id", get(job_handlers::top_resumes))
        .with_state(state)
}
