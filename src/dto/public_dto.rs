use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::attempt::{CompletionStatus, JsonMap};
use crate::models::exam::DisplayMode;
use crate::models::question::PublicQuestion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub display_mode: DisplayMode,
    pub total_questions: usize,
    pub passing_score: f64,
}

/// Client autosave timings published with every state read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveHints {
    pub interval_seconds: u64,
    pub debounce_ms: u64,
}

/// Authoritative view of one attempt, as returned by `get_state` and
/// embedded in version-conflict responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptState {
    pub attempt_id: Uuid,
    pub exam: ExamSummary,
    pub questions: Vec<PublicQuestion>,
    pub answers: JsonMap,
    pub auto_save_data: JsonMap,
    pub version: i64,
    pub completion_status: CompletionStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_remaining_seconds: Option<i64>,
    pub autosave: AutosaveHints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccessRequest {
    Open {
        #[serde(default)]
        student_id: Option<Uuid>,
    },
    Code {
        code: String,
    },
    Ip {
        #[serde(default)]
        student_id: Option<Uuid>,
    },
}

fn validate_access(access: &AccessRequest) -> Result<(), ValidationError> {
    if let AccessRequest::Code { code } = access {
        let trimmed = code.trim();
        if trimmed.is_empty() || trimmed.len() > 64 {
            return Err(ValidationError::new("invalid_code"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAttemptRequest {
    #[validate(custom(function = "validate_access"))]
    pub access: AccessRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttemptResponse {
    pub attempt_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswersRequest {
    #[serde(default)]
    pub answers: JsonMap,
    #[serde(default)]
    pub auto_save_data: JsonMap,
    #[validate(range(min = 1, message = "expected_version starts at 1"))]
    pub expected_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswersResponse {
    pub new_version: i64,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub ok: bool,
    pub attempt_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub already_submitted: bool,
}
