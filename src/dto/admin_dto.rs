use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::attempt::{Attempt, CompletionStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct ListAttemptsQuery {
    pub exam_id: Option<Uuid>,
    pub status: Option<CompletionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptListItem {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub student_id: Option<Uuid>,
    pub code_id: Option<Uuid>,
    pub completion_status: CompletionStatus,
    pub version: i64,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_saved_at: DateTime<Utc>,
    pub answered: usize,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub needs_review: Option<bool>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl From<&Attempt> for AttemptListItem {
    fn from(a: &Attempt) -> Self {
        Self {
            id: a.id,
            exam_id: a.exam_id,
            student_id: a.student_id,
            code_id: a.code_id,
            completion_status: a.completion_status,
            version: a.version,
            started_at: a.started_at,
            submitted_at: a.submitted_at,
            last_saved_at: a.last_saved_at,
            answered: a.answers.0.len(),
            score: a.score.and_then(|d| d.to_string().parse().ok()),
            max_score: a.max_score.and_then(|d| d.to_string().parse().ok()),
            needs_review: a.needs_review,
            graded_at: a.graded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptListResponse {
    pub items: Vec<AttemptListItem>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamActivity {
    pub exam_id: Uuid,
    pub in_progress: i64,
    pub submitted: i64,
    pub abandoned: i64,
    pub live: i64,
    pub awaiting_grading: i64,
}
