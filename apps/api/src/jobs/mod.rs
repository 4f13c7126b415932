//! Query Service: read-side ranking of similarity scores recorded by the
//! webhook pipeline.

pub mod handlers;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::RankedResumeRow;
use crate::models::rows::MatchSection;

/// Sort key for the per-job resume listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortCriteria {
    OverallScore,
    SkillsMatch,
    ExperienceMatch,
    EducationMatch,
}

impl SortCriteria {
    /// The section name the scorer uses for this criterion, or `None` for
    /// the overall score.
    fn section_name(self) -> Option<&'static str> {
        match self {
            SortCriteria::OverallScore => None,
            SortCriteria::SkillsMatch => Some("Skills Match"),
            SortCriteria::ExperienceMatch => Some("Experience Match"),
            SortCriteria::EducationMatch => Some("Education Match"),
        }
    }
}

impl Default for SortCriteria {
    fn default() -> Self {
        SortCriteria::OverallScore
    }
}

/// One entry of the ranked listing returned to clients.
#[derive(Debug, Serialize)]
pub struct RankedResume {
    pub title: String,
    pub id: i64,
    pub candidate_id: i64,
    pub candidate_name: String,
    pub overall_score: f64,
    pub match_details: Vec<MatchSection>,
    pub company_bg_details: Option<Value>,
}

/// Ranks scored resumes by the requested criterion and truncates to `limit`.
///
/// Overall-score ordering is already pushed into SQL; sub-metric ordering
/// re-ranks in memory by locating the named sub-score in each row's match
/// details (missing sub-score ranks as 0). The sort is stable, so ties keep
/// database order, and truncation always happens after ranking.
pub fn rank_resumes(
    rows: Vec<RankedResumeRow>,
    sort_by: SortCriteria,
    limit: usize,
) -> Vec<RankedResume> {
    let mut entries: Vec<(f64, RankedResume)> = rows
        .into_iter()
        .map(|row| {
            let sort_score = match sort_by.section_name() {
                None => row.overall_score,
                Some(section) => sub_score(&row.match_details.0, section),
            };
            let candidate_name = format!("{} {}", row.first_name, row.last_name)
                .trim()
                .to_string();
            (
                sort_score,
                RankedResume {
                    title: row.job_title,
                    id: row.id,
                    candidate_id: row.candidate_id,
                    candidate_name,
                    overall_score: row.overall_score,
                    match_details: row.match_details.0,
                    company_bg_details: row.company_bg_details,
                },
            )
        })
        .collect();

    if sort_by != SortCriteria::OverallScore {
        entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    }

    entries.truncate(limit);
    entries.into_iter().map(|(_, entry)| entry).collect()
}

fn sub_score(details: &[MatchSection], section: &str) -> f64 {
    details
        .iter()
        .find(|d| d.name == section)
        .map(|d| d.score)
        .unwrap_or(0.0)
}
