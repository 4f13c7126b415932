use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::webhook::WebhookEnvelope;
use crate::state::AppState;
use crate::webhook::pipeline;
use crate::webhook::signature::verify_signature;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
    pub candidate_id: i64,
    pub job_id: i64,
    pub application_id: i64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
}

/// POST /simulate_webhook
///
/// Takes the body as raw `Bytes`: the signature covers the exact bytes the
/// ATS sent, so verification must happen before JSON parsing.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    let signature = headers
        .get("Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing signature header");
            AppError::InvalidSignature
        })?;

    if !verify_signature(&state.config.webhook_secret, &body, signature) {
        warn!("Invalid signature received.");
        return Err(AppError::InvalidSignature);
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {e}")))?;

    info!("Incoming webhook data received");
    let outcome = pipeline::process_webhook(&state, envelope).await?;

    Ok((
        StatusCode::CREATED,
        Json(WebhookResponse {
            message: "Webhook received and processed".to_string(),
            candidate_id: outcome.candidate_id,
            job_id: outcome.job_id,
            application_id: outcome.application_id,
            status: "new",
            overall_score: outcome.overall_score,
        }),
    ))
}
