use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// The variants map onto the webhook pipeline's failure taxonomy: a bad
/// signature rejects before any processing, a duplicate application id
/// short-circuits with 409, and anything past the JD stage that fails hard
/// surfaces as 500 even though earlier entity writes are already committed.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Application already exists: {application_id}")]
    DuplicateApplication { application_id: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Job board error: {0}")]
    JobBoard(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            // The duplicate-application response carries the existing
            // record's id so the sender can correlate the redelivery.
            AppError::DuplicateApplication { application_id } => {
                let body = Json(json!({
                    "message": "Application already exists",
                    "application_id": application_id,
                    "status": "existing"
                }));
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::InvalidSignature => {
                (StatusCode::FORBIDDEN, "Invalid signature".to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error processing job description: {msg}"),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A storage error occurred".to_string(),
                )
            }
            AppError::JobBoard(msg) => {
                tracing::error!("Job board error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error fetching job content: {msg}"),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "detail": detail }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_application_maps_to_conflict() {
        let response = AppError::DuplicateApplication { application_id: 555 }.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["application_id"], 555);
        assert_eq!(body["status"], "existing");
        assert_eq!(body["message"], "Application already exists");
    }

    #[tokio::test]
    async fn test_not_found_carries_detail_body() {
        let response = AppError::NotFound("No resumes found for job ID 9999".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["detail"], "No resumes found for job ID 9999");
    }

    #[tokio::test]
    async fn test_invalid_signature_is_forbidden() {
        let response = AppError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
