use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamCode {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub code: String,
    pub max_uses: Option<i32>,
    pub uses: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ExamCode {
    pub fn has_uses_left(&self) -> bool {
        self.is_active && self.max_uses.map_or(true, |max| self.uses < max)
    }
}
