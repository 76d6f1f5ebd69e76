use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    AllAtOnce,
    OnePerPage,
}

impl TryFrom<String> for DisplayMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "all_at_once" => Ok(Self::AllAtOnce),
            "one_per_page" => Ok(Self::OnePerPage),
            other => Err(format!("unknown display mode '{}'", other)),
        }
    }
}

/// How students get into an exam. Decides which identity an attempt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Open,
    Code,
    IpRestricted,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Open => "open",
            AccessMode::Code => "code",
            AccessMode::IpRestricted => "ip_restricted",
        }
    }
}

impl TryFrom<String> for AccessMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "open" => Ok(Self::Open),
            "code" => Ok(Self::Code),
            "ip_restricted" => Ok(Self::IpRestricted),
            other => Err(format!("unknown access mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exam {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    #[sqlx(try_from = "String")]
    pub display_mode: DisplayMode,
    pub shuffle_questions: bool,
    #[sqlx(try_from = "String")]
    pub access_mode: AccessMode,
    pub allowed_ip_ranges: Vec<IpNetwork>,
    pub passing_score: rust_decimal::Decimal,
    pub is_active: bool,
    pub questions: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    pub fn question_list(&self) -> crate::error::Result<Vec<Question>> {
        Ok(serde_json::from_value(self.questions.clone())?)
    }
}
