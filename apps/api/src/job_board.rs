//! Job-board collaborator: fetches the public job post (long-form content,
//! location, pay ranges) for a job id. The board returns pay ranges in
//! cents; conversion to currency units happens before persistence.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::models::rows::{PayBand, PayRange};

#[derive(Debug, Error)]
pub enum JobBoardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job board returned status {status} for job {job_id}")]
    Status { status: u16, job_id: i64 },
}

/// Job post document as returned by the board API.
#[derive(Debug, Clone, Deserialize)]
pub struct JobPostContent {
    pub internal_job_id: i64,
    pub title: String,
    pub content: String,
    pub absolute_url: Option<String>,
    pub location: Option<JobLocation>,
    #[serde(default)]
    pub pay_input_ranges: Vec<PayInputRange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobLocation {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayInputRange {
    pub min_cents: i64,
    pub max_cents: i64,
    pub currency_type: String,
    pub title: String,
}

impl JobPostContent {
    /// Pay bands in currency units, or `None` when the post carries none.
    pub fn pay_range(&self) -> Option<PayRange> {
        if self.pay_input_ranges.is_empty() {
            return None;
        }
        Some(PayRange {
            ranges: self
                .pay_input_ranges
                .iter()
                .map(|r| PayBand {
                    min_value: r.min_cents as f64 / 100.0,
                    max_value: r.max_cents as f64 / 100.0,
                    currency: r.currency_type.clone(),
                    title: r.title.clone(),
                })
                .collect(),
        })
    }

    pub fn location_name(&self) -> Option<String> {
        self.location.as_ref().map(|l| l.name.clone())
    }
}

/// Seam for the board API so pipeline tests can substitute a fake.
#[async_trait]
pub trait JobBoard: Send + Sync {
    async fn fetch_job_content(&self, job_id: i64) -> Result<JobPostContent, JobBoardError>;
}

pub struct HttpJobBoard {
    http: reqwest::Client,
    base_url: String,
    board_token: String,
}

impl HttpJobBoard {
    pub fn new(base_url: String, board_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            board_token,
        }
    }
}

#[async_trait]
impl JobBoard for HttpJobBoard {
    async fn fetch_job_content(&self, job_id: i64) -> Result<JobPostContent, JobBoardError> {
        info!("Fetching job content for job_id: {job_id}");

        let url = format!(
            "{}/v1/boards/{}/jobs/{}",
            self.base_url, self.board_token, job_id
        );
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobBoardError::Status {
                status: status.as_u16(),
                job_id,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_range_converts_cents() {
        let post: JobPostContent = serde_json::from_value(serde_json::json!({
            "internal_job_id": 9001,
            "title": "Engineer",
            "content": "text",
            "absolute_url": "https://x/careers?gh_jid=42",
            "location": {"name": "Remote"},
            "pay_input_ranges": [
                {"min_cents": 8_500_000, "max_cents": 12_000_050, "currency_type": "USD", "title": "Base"}
            ]
        }))
        .unwrap();

        let range = post.pay_range().unwrap();
        assert_eq!(range.ranges[0].min_value, 85_000.0);
        assert_eq!(range.ranges[0].max_value, 120_000.5);
        assert_eq!(range.ranges[0].currency, "USD");
        assert_eq!(post.location_name().as_deref(), Some("Remote"));
    }

    #[test]
    fn test_pay_range_absent() {
        let post: JobPostContent = serde_json::from_value(serde_json::json!({
            "internal_job_id": 9001,
            "title": "Engineer",
            "content": "text"
        }))
        .unwrap();

        assert!(post.pay_range().is_none());
        assert!(post.location_name().is_none());
    }
}
