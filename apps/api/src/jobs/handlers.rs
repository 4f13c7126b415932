use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dao;
use crate::errors::AppError;
use crate::jobs::{rank_resumes, RankedResume, SortCriteria};
use crate::state::AppState;

const TOP_RESUMES_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct RankedResumesQuery {
    #[serde(default)]
    pub sort_by: SortCriteria,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

/// GET /jobs/:job_id/resumes
///
/// An unknown `sort_by` value fails `Query` extraction and comes back as a
/// 400 before this handler runs.
pub async fn ranked_resumes(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(params): Query<RankedResumesQuery>,
) -> Result<Json<Vec<RankedResume>>, AppError> {
    if !(1..=50).contains(&params.limit) {
        return Err(AppError::Validation(
            "limit must be between 1 and 50".to_string(),
        ));
    }

    info!(
        "Fetching resumes for job ID {job_id}, sorted by {:?}",
        params.sort_by
    );
    let rows = dao::scored_resumes_for_job(
        &state.db,
        job_id,
        params.sort_by == SortCriteria::OverallScore,
    )
    .await?;

    let ranked = rank_resumes(rows, params.sort_by, params.limit as usize);
    if ranked.is_empty() {
        return Err(AppError::NotFound(format!(
            "No resumes found for job ID {job_id}"
        )));
    }

    Ok(Json(ranked))
}

#[derive(Debug, Serialize)]
pub struct TopResume {
    pub candidate_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub overall_score: f64,
}

/// GET /top-resumes/:job_id
///
/// Compact top-10 listing by overall score, keyed by the external
/// candidate id.
pub async fn top_resumes(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<Vec<TopResume>>, AppError> {
    let scores = dao::top_scores_for_job(&state.db, job_id, TOP_RESUMES_LIMIT).await?;
    if scores.is_empty() {
        return Err(AppError::NotFound(format!(
            "No resumes found for job ID {job_id}"
        )));
    }

    let mut entries = Vec::with_capacity(scores.len());
    for score in scores {
        let candidate = dao::get_candidate(&state.db, score.candidate_id).await?;
        entries.push(TopResume {
            candidate_id: candidate.candidate_id,
            first_name: candidate.first_name,
            last_name: candidate.last_name,
            overall_score: score.overall_score,
        });
    }

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let params: RankedResumesQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(params.sort_by, SortCriteria::OverallScore);
        assert_eq!(params.limit, 10);
    }

    #[test]
    fn test_query_accepts_sub_metric_sort() {
        let params: RankedResumesQuery =
            serde_json::from_str(r#"{"sort_by": "education_match", "limit": 25}"#).unwrap();
        assert_eq!(params.sort_by, SortCriteria::EducationMatch);
        assert_eq!(params.limit, 25);
    }
}
