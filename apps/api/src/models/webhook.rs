//! Inbound ATS webhook payload.
//!
//! Deserialized only after the raw body's HMAC signature has been verified.
//! Serde derives double as payload validation: missing required keys fail
//! deserialization and surface as a 400 before any entity write.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub application: ApplicationPayload,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationPayload {
    pub id: i64,
    pub status: String,
    pub applied_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub source: Option<Value>,
    pub current_stage: Option<Value>,
    pub candidate: CandidatePayload,
    #[serde(default)]
    pub jobs: Vec<JobPayload>,
}

impl ApplicationPayload {
    /// The job this application targets. The ATS sends the jobs array with
    /// the applied-to job first.
    pub fn primary_job(&self) -> Option<&JobPayload> {
        self.jobs.first()
    }
}

#[derive(Debug, Deserialize)]
pub struct CandidatePayload {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub phone_numbers: Vec<TypedContact>,
    #[serde(default)]
    pub email_addresses: Vec<TypedContact>,
    #[serde(default)]
    pub educations: Vec<Value>,
    #[serde(default)]
    pub addresses: Vec<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    // Defaults to `{}`, not `Value::Null`: jsonb null would break the `||`
    // merge in the candidate backfill (Postgres treats a non-object operand
    // as a single-element array).
    #[serde(default = "empty_object")]
    pub custom_fields: Value,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// A contact entry such as `{"type": "mobile", "value": "+1..."}`.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TypedContact {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub filename: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AttachmentPayload {
    pub fn is_resume(&self) -> bool {
        self.kind == "resume"
    }
}

#[derive(Debug, Deserialize)]
pub struct JobPayload {
    pub id: i64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub departments: Vec<Value>,
    #[serde(default)]
    pub offices: Vec<Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_payload_decodes() {
        let body = serde_json::json!({
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
                    "jobs": [{"id": 42, "name": "Engineer", "status": "open"}]
                }
            }
        });

        let envelope: WebhookEnvelope = serde_json::from_value(body).unwrap();
        let application = &envelope.payload.application;
        assert_eq!(application.id, 555);
        assert_eq!(application.candidate.id, 1);
        assert_eq!(application.primary_job().unwrap().id, 42);
        assert!(application.candidate.attachments[0].is_resume());
    }

    #[test]
    fn test_missing_candidate_is_rejected() {
        let body = serde_json::json!({
            "payload": {
                "application": {
                    "id": 555,
                    "status": "active",
                    "applied_at": "2024-03-01T10:00:00Z",
                    "jobs": []
                }
            }
        });

        assert!(serde_json::from_value::<WebhookEnvelope>(body).is_err());
    }

    #[test]
    fn test_missing_custom_fields_defaults_to_empty_object() {
        let body = serde_json::json!({
            "id": 7,
            "first_name": "C",
            "last_name": "D"
        });

        let candidate: CandidatePayload = serde_json::from_value(body).unwrap();
        assert_eq!(candidate.custom_fields, serde_json::json!({}));
        assert!(candidate.custom_fields.is_object());
    }

    #[test]
    fn test_contact_lists_are_typed() {
        let body = serde_json::json!({
            "id": 7,
            "first_name": "C",
            "last_name": "D",
            "phone_numbers": [{"type": "mobile", "value": "+15550100"}],
            "email_addresses": [{"type": "personal", "value": "c@d.example"}]
        });

        let candidate: CandidatePayload = serde_json::from_value(body).unwrap();
        assert_eq!(candidate.phone_numbers[0].value, "+15550100");
        assert_eq!(candidate.email_addresses[0].kind.as_deref(), Some("personal"));
    }
}
