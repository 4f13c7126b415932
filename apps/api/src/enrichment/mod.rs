//! Enrichment Client: the LLM-backed operations the webhook pipeline
//! depends on. Each is a single stateless request; any one may fail without
//! implying the others will, and the pipeline applies its own failure policy
//! per stage (JD formatting fatal, resume and scoring best-effort).

pub mod client;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

pub use client::{EnrichmentError, LlmClient};

use crate::models::rows::MatchSection;

/// Parsed output of the similarity scorer. Deserialization failure (missing
/// `matching_score` or `sections`) is a hard error signalling a malformed
/// model response, never silently defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityAnalysis {
    pub matching_score: f64,
    pub sections: Vec<MatchSection>,
    #[serde(default)]
    pub potential_gaps: Vec<Value>,
}

/// Seam for the enrichment operations, for the same reason the attachment
/// store and job board are traits: pipeline tests substitute fakes.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Reformats a raw job description into structured JSON.
    ///
    /// Returns the model's raw text: the caller strips code fences and
    /// parses, so a malformed response fails at the persistence boundary
    /// where the pipeline treats it as fatal.
    async fn format_job_description(&self, jd_text: &str) -> Result<String, EnrichmentError>;

    /// Reformats raw resume text into structured JSON, validating the output
    /// itself. Returns `None` when the model's response does not parse; the
    /// caller treats that as a recoverable failure.
    async fn format_resume(&self, resume_text: &str) -> Result<Option<Value>, EnrichmentError>;

    /// Summarizes the candidate's two most recent employers into a short
    /// company-background narrative. Returns `None` when the formatted
    /// resume carries no work experience.
    async fn company_background(
        &self,
        formatted_resume: &Value,
    ) -> Result<Option<String>, EnrichmentError>;

    /// Scores a formatted resume against a formatted JD.
    ///
    /// The model is told to return bare JSON but sometimes wraps it in
    /// prose; extraction falls back to scanning for the outermost braces
    /// before giving up on the response.
    async fn score_similarity(
        &self,
        resume_sections: &Value,
        jd_sections: &Value,
        application_id: i64,
    ) -> Result<SimilarityAnalysis, EnrichmentError>;
}

#[async_trait]
impl Enricher for LlmClient {
    async fn format_job_description(&self, jd_text: &str) -> Result<String, EnrichmentError> {
        let prompt = prompts::JD_FORMAT_PROMPT.replace("{jd_text}", jd_text);
        self.complete(&prompt, prompts::JD_FORMAT_SYSTEM).await
    }

    async fn format_resume(&self, resume_text: &str) -> Result<Option<Value>, EnrichmentError> {
        let prompt = prompts::RESUME_FORMAT_PROMPT.replace("{resume_text}", resume_text);
        let response = self.complete(&prompt, prompts::RESUME_FORMAT_SYSTEM).await?;

        let cleaned = strip_json_fences(&response);
        match serde_json::from_str::<Value>(cleaned) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                error!("Error parsing resume response as JSON: {e}");
                Ok(None)
            }
        }
    }

    async fn company_background(
        &self,
        formatted_resume: &Value,
    ) -> Result<Option<String>, EnrichmentError> {
        let Some(experience) = formatted_resume
            .get("workExperience")
            .and_then(|v| v.as_array())
            .filter(|arr| !arr.is_empty())
        else {
            return Ok(None);
        };

        let details: Vec<String> = experience
            .iter()
            .take(2)
            .map(|exp| {
                format!(
                    "Company: {}\nPosition: {}\nResponsibilities: {}\nAchievements: {}",
                    exp.get("companyName").and_then(|v| v.as_str()).unwrap_or(""),
                    exp.get("position").and_then(|v| v.as_str()).unwrap_or(""),
                    join_strings(exp.get("responsibilities")),
                    join_strings(exp.get("achievements")),
                )
            })
            .collect();

        let prompt =
            prompts::COMPANY_BACKGROUND_PROMPT.replace("{experience}", &details.join("\n\n"));
        let summary = self
            .complete(&prompt, prompts::COMPANY_BACKGROUND_SYSTEM)
            .await?;
        Ok(Some(summary.trim().to_string()))
    }

    async fn score_similarity(
        &self,
        resume_sections: &Value,
        jd_sections: &Value,
        application_id: i64,
    ) -> Result<SimilarityAnalysis, EnrichmentError> {
        info!("Generating similarity scores for application ID: {application_id}");

        let prompt = prompts::SIMILARITY_PROMPT
            .replace(
                "{processed_jd}",
                &serde_json::to_string_pretty(jd_sections)?,
            )
            .replace(
                "{processed_resume}",
                &serde_json::to_string_pretty(resume_sections)?,
            );

        let response = self.complete(&prompt, prompts::SIMILARITY_SYSTEM).await?;
        parse_similarity_response(&response)
    }
}

fn parse_similarity_response(response: &str) -> Result<SimilarityAnalysis, EnrichmentError> {
    let cleaned = strip_json_fences(response);

    let raw = match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => v,
        Err(_) => {
            let extracted = extract_json_object(cleaned).ok_or_else(|| {
                EnrichmentError::MalformedAnalysis(
                    "no JSON object found in scoring response".to_string(),
                )
            })?;
            serde_json::from_str(extracted)?
        }
    };

    serde_json::from_value(raw).map_err(|e| {
        EnrichmentError::MalformedAnalysis(format!("scoring response missing required keys: {e}"))
    })
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Extracts the first-`{`-to-last-`}` slice of `text`, for responses where
/// the model surrounds the JSON object with explanatory prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn join_strings(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let input = "Here is the analysis you asked for:\n{\"matching_score\": 75}\nLet me know!";
        assert_eq!(
            extract_json_object(input),
            Some("{\"matching_score\": 75}")
        );
    }

    #[test]
    fn test_extract_json_object_none_without_braces() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_similarity_response_plain() {
        let response = r#"{
            "matching_score": 72.0,
            "sections": [
                {"name": "Skills Match", "score": 80, "max_score": 100, "overview": "good"},
                {"name": "Experience Match", "score": 64, "max_score": 100, "overview": "ok"}
            ],
            "potential_gaps": [{"description": "no kubernetes"}]
        }"#;

        let analysis = parse_similarity_response(response).unwrap();
        assert_eq!(analysis.matching_score, 72.0);
        assert_eq!(analysis.sections.len(), 2);
        assert_eq!(analysis.sections[0].name, "Skills Match");
        assert_eq!(analysis.potential_gaps.len(), 1);
    }

    #[test]
    fn test_parse_similarity_response_wrapped_in_prose() {
        let response = "Sure, here is the evaluation:\n\
            {\"matching_score\": 55, \"sections\": []}\n\
            Hope this helps.";

        let analysis = parse_similarity_response(response).unwrap();
        assert_eq!(analysis.matching_score, 55.0);
    }

    #[test]
    fn test_parse_similarity_response_missing_score_is_hard_error() {
        let response = r#"{"sections": []}"#;
        let err = parse_similarity_response(response).unwrap_err();
        assert!(matches!(err, EnrichmentError::MalformedAnalysis(_)));
    }

    #[test]
    fn test_parse_similarity_response_no_json_is_hard_error() {
        let err = parse_similarity_response("I could not evaluate this resume.").unwrap_err();
        assert!(matches!(err, EnrichmentError::MalformedAnalysis(_)));
    }
}
