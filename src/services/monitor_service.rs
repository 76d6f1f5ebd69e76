use std::sync::Arc;

use uuid::Uuid;

use crate::dto::admin_dto::{AttemptListItem, AttemptListResponse, ExamActivity, ListAttemptsQuery};
use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::store::{AttemptFilter, AttemptStore};
use crate::utils::time::now;

#[derive(Clone)]
pub struct MonitorService {
    store: Arc<dyn AttemptStore>,
}

impl MonitorService {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub async fn list_attempts(&self, query: ListAttemptsQuery) -> Result<AttemptListResponse> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(50).clamp(1, 500);

        let (rows, total) = self
            .store
            .list_attempts(AttemptFilter {
                exam_id: query.exam_id,
                status: query.status,
                offset: (page - 1).saturating_mul(limit),
                limit,
            })
            .await?;

        Ok(AttemptListResponse {
            items: rows.iter().map(AttemptListItem::from).collect(),
            total,
            page,
            limit,
        })
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.store
            .load(attempt_id)
            .await?
            .map(|record| record.attempt)
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    /// Counts per status; "live" means saved within the last two minutes.
    pub async fn exam_activity(&self, exam_id: Uuid) -> Result<ExamActivity> {
        if self.store.find_exam(exam_id).await?.is_none() {
            return Err(Error::NotFound(format!("Exam {} not found", exam_id)));
        }
        let live_since = now() - chrono::Duration::minutes(2);
        self.store.exam_activity(exam_id, live_since).await
    }
}
