use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Question id -> answer value. Values are a single choice, a list, or free text.
pub type JsonMap = Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Submitted,
    Abandoned,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Submitted => "submitted",
            CompletionStatus::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for CompletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "submitted" => Ok(Self::Submitted),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown completion status '{}'", other)),
        }
    }
}

impl TryFrom<String> for CompletionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub student_id: Option<Uuid>,
    pub code_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub completion_status: CompletionStatus,
    pub answers: Json<JsonMap>,
    pub auto_save_data: Json<JsonMap>,
    pub version: i64,
    pub last_saved_at: DateTime<Utc>,
    pub client_ip: Option<IpNetwork>,
    pub score: Option<rust_decimal::Decimal>,
    pub max_score: Option<rust_decimal::Decimal>,
    pub needs_review: Option<bool>,
    pub graded_answers: Option<JsonValue>,
    pub graded_at: Option<DateTime<Utc>>,
    pub grading_attempts: i32,
    pub grading_error: Option<String>,
    pub next_grading_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn is_submitted(&self) -> bool {
        self.completion_status == CompletionStatus::Submitted
    }
}

/// Row the entry flow inserts. Everything else takes its column default.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub exam_id: Uuid,
    pub student_id: Option<Uuid>,
    pub code_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub client_ip: Option<IpNetwork>,
}
