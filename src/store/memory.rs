use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dto::admin_dto::ExamActivity;
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, CompletionStatus, JsonMap, NewAttempt};
use crate::models::audit_log::{AuditLog, NewAuditEntry};
use crate::models::exam::Exam;
use crate::models::exam_code::ExamCode;
use crate::services::grading_service::GradeReport;
use crate::store::{AttemptFilter, AttemptRecord, AttemptStore};

#[derive(Default)]
struct Tables {
    exams: HashMap<Uuid, Exam>,
    codes: HashMap<Uuid, ExamCode>,
    attempts: HashMap<Uuid, Attempt>,
    audit: Vec<AuditLog>,
}

/// Process-local store for tests and single-node local runs. Every guarded
/// write runs under the one write lock, which makes check-and-write atomic.
#[derive(Clone, Default)]
pub struct MemoryAttemptStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds exam metadata, which this service never writes itself.
    pub async fn put_exam(&self, exam: Exam) {
        self.tables.write().await.exams.insert(exam.id, exam);
    }

    pub async fn put_code(&self, code: ExamCode) {
        self.tables.write().await.codes.insert(code.id, code);
    }

    /// Test hook for the inactivity sweep.
    pub async fn set_last_saved_at(&self, attempt_id: Uuid, at: DateTime<Utc>) {
        if let Some(attempt) = self.tables.write().await.attempts.get_mut(&attempt_id) {
            attempt.last_saved_at = at;
        }
    }

    pub async fn audit_entries(&self) -> Vec<AuditLog> {
        self.tables.read().await.audit.clone()
    }
}

fn record_for(tables: &Tables, attempt: &Attempt) -> Option<AttemptRecord> {
    tables.exams.get(&attempt.exam_id).map(|exam| AttemptRecord {
        attempt: attempt.clone(),
        exam: exam.clone(),
    })
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn load(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>> {
        let tables = self.tables.read().await;
        let Some(attempt) = tables.attempts.get(&attempt_id) else {
            return Ok(None);
        };
        record_for(&tables, attempt)
            .map(Some)
            .ok_or_else(|| Error::Internal(format!("Attempt {} references a missing exam", attempt_id)))
    }

    async fn try_save(
        &self,
        attempt_id: Uuid,
        expected_version: i64,
        answers: JsonMap,
        auto_save_data: JsonMap,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let mut tables = self.tables.write().await;
        let Some(attempt) = tables.attempts.get_mut(&attempt_id) else {
            return Ok(None);
        };
        if attempt.completion_status != CompletionStatus::InProgress || attempt.version != expected_version {
            return Ok(None);
        }

        attempt.answers.0.extend(answers);
        attempt.auto_save_data = Json(auto_save_data);
        attempt.version += 1;
        attempt.last_saved_at = now;
        Ok(Some(attempt.version))
    }

    async fn try_submit(&self, attempt_id: Uuid, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let mut tables = self.tables.write().await;
        let Some(attempt) = tables.attempts.get_mut(&attempt_id) else {
            return Ok(None);
        };
        if attempt.completion_status != CompletionStatus::InProgress {
            return Ok(None);
        }

        attempt.completion_status = CompletionStatus::Submitted;
        attempt.submitted_at = Some(now);
        attempt.next_grading_at = Some(now);
        Ok(Some(now))
    }

    async fn find_exam(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        Ok(self.tables.read().await.exams.get(&exam_id).cloned())
    }

    async fn redeem_code(&self, exam_id: Uuid, code: String) -> Result<Option<ExamCode>> {
        let mut tables = self.tables.write().await;
        let found = tables
            .codes
            .values_mut()
            .find(|c| c.exam_id == exam_id && c.code == code && c.has_uses_left());
        Ok(found.map(|c| {
            c.uses += 1;
            c.clone()
        }))
    }

    async fn release_code(&self, code_id: Uuid) -> Result<()> {
        if let Some(code) = self.tables.write().await.codes.get_mut(&code_id) {
            code.uses = (code.uses - 1).max(0);
        }
        Ok(())
    }

    async fn insert_attempt(&self, new_attempt: NewAttempt) -> Result<Attempt> {
        let attempt = Attempt {
            id: Uuid::new_v4(),
            exam_id: new_attempt.exam_id,
            student_id: new_attempt.student_id,
            code_id: new_attempt.code_id,
            started_at: new_attempt.started_at,
            submitted_at: None,
            completion_status: CompletionStatus::InProgress,
            answers: Json(JsonMap::new()),
            auto_save_data: Json(JsonMap::new()),
            version: 1,
            last_saved_at: new_attempt.started_at,
            client_ip: new_attempt.client_ip,
            score: None,
            max_score: None,
            needs_review: None,
            graded_answers: None,
            graded_at: None,
            grading_attempts: 0,
            grading_error: None,
            next_grading_at: None,
        };
        self.tables
            .write()
            .await
            .attempts
            .insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn claim_ungraded(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<AttemptRecord>> {
        let mut tables = self.tables.write().await;
        let mut due: Vec<&mut Attempt> = tables
            .attempts
            .values_mut()
            .filter(|a| {
                a.completion_status == CompletionStatus::Submitted
                    && a.graded_at.is_none()
                    && a.grading_attempts < max_attempts
                    && a.next_grading_at.map_or(true, |at| at <= now)
            })
            .collect();
        due.sort_by_key(|a| a.submitted_at);

        let mut claimed = Vec::new();
        for attempt in due.into_iter().take(limit.max(0) as usize) {
            attempt.next_grading_at = Some(lease_until);
            claimed.push(attempt.clone());
        }
        Ok(claimed
            .iter()
            .filter_map(|attempt| record_for(&tables, attempt))
            .collect())
    }

    async fn record_grade(&self, attempt_id: Uuid, report: GradeReport, now: DateTime<Utc>) -> Result<()> {
        let graded_answers = serde_json::to_value(&report.answers)?;
        let mut tables = self.tables.write().await;
        if let Some(attempt) = tables.attempts.get_mut(&attempt_id) {
            if attempt.graded_at.is_none() {
                attempt.score = Some(Decimal::from(report.score));
                attempt.max_score = Some(Decimal::from(report.max_score));
                attempt.needs_review = Some(report.needs_review);
                attempt.graded_answers = Some(graded_answers);
                attempt.graded_at = Some(now);
                attempt.grading_error = None;
                attempt.next_grading_at = None;
            }
        }
        Ok(())
    }

    async fn record_grading_failure(
        &self,
        attempt_id: Uuid,
        error: String,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(attempt) = tables.attempts.get_mut(&attempt_id) {
            if attempt.graded_at.is_none() {
                attempt.grading_attempts += 1;
                attempt.grading_error = Some(error);
                attempt.next_grading_at = Some(next_retry_at);
            }
        }
        Ok(())
    }

    async fn abandon_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut closed = 0;
        for attempt in tables.attempts.values_mut() {
            if attempt.completion_status == CompletionStatus::InProgress && attempt.last_saved_at < cutoff {
                attempt.completion_status = CompletionStatus::Abandoned;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn list_attempts(&self, filter: AttemptFilter) -> Result<(Vec<Attempt>, i64)> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|a| filter.exam_id.map_or(true, |id| a.exam_id == id))
            .filter(|a| filter.status.map_or(true, |s| a.completion_status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn exam_activity(&self, exam_id: Uuid, live_since: DateTime<Utc>) -> Result<ExamActivity> {
        let tables = self.tables.read().await;
        let mut activity = ExamActivity {
            exam_id,
            ..ExamActivity::default()
        };
        for attempt in tables.attempts.values().filter(|a| a.exam_id == exam_id) {
            match attempt.completion_status {
                CompletionStatus::InProgress => {
                    activity.in_progress += 1;
                    if attempt.last_saved_at >= live_since {
                        activity.live += 1;
                    }
                }
                CompletionStatus::Submitted => {
                    activity.submitted += 1;
                    if attempt.graded_at.is_none() {
                        activity.awaiting_grading += 1;
                    }
                }
                CompletionStatus::Abandoned => activity.abandoned += 1,
            }
        }
        Ok(activity)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()> {
        self.tables.write().await.audit.push(AuditLog {
            id: Uuid::new_v4(),
            actor: entry.actor,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            changes: entry.changes,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exam() -> Exam {
        Exam {
            id: Uuid::new_v4(),
            title: "Algebra".into(),
            description: None,
            duration_minutes: 30,
            display_mode: crate::models::exam::DisplayMode::AllAtOnce,
            shuffle_questions: false,
            access_mode: crate::models::exam::AccessMode::Open,
            allowed_ip_ranges: Vec::new(),
            passing_score: Decimal::from(50),
            is_active: true,
            questions: json!([]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn map(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn guarded_save_merges_and_bumps_version() {
        tokio_test::block_on(async {
            let store = MemoryAttemptStore::new();
            let exam = exam();
            store.put_exam(exam.clone()).await;
            let attempt = store
                .insert_attempt(NewAttempt {
                    exam_id: exam.id,
                    student_id: None,
                    code_id: None,
                    started_at: Utc::now(),
                    client_ip: None,
                })
                .await
                .unwrap();

            let v2 = store
                .try_save(attempt.id, 1, map(json!({"q1": "A"})), map(json!({"n": 1})), Utc::now())
                .await
                .unwrap();
            assert_eq!(v2, Some(2));

            let stale = store
                .try_save(attempt.id, 1, map(json!({"q1": "Z"})), JsonMap::new(), Utc::now())
                .await
                .unwrap();
            assert_eq!(stale, None);

            let v3 = store
                .try_save(attempt.id, 2, map(json!({"q2": "B"})), JsonMap::new(), Utc::now())
                .await
                .unwrap();
            assert_eq!(v3, Some(3));

            let stored = store.load(attempt.id).await.unwrap().unwrap().attempt;
            assert_eq!(stored.answers.0, map(json!({"q1": "A", "q2": "B"})));
            assert!(stored.auto_save_data.0.is_empty());
        });
    }

    #[test]
    fn attempt_without_exam_is_an_internal_error() {
        tokio_test::block_on(async {
            let store = MemoryAttemptStore::new();
            let orphan = store
                .insert_attempt(NewAttempt {
                    exam_id: Uuid::new_v4(),
                    student_id: None,
                    code_id: None,
                    started_at: Utc::now(),
                    client_ip: None,
                })
                .await
                .unwrap();

            assert!(matches!(store.load(orphan.id).await, Err(Error::Internal(_))));
            assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
        });
    }

    #[test]
    fn released_code_use_can_be_redeemed_again() {
        tokio_test::block_on(async {
            let store = MemoryAttemptStore::new();
            let exam = exam();
            store.put_exam(exam.clone()).await;
            let code_id = Uuid::new_v4();
            store
                .put_code(ExamCode {
                    id: code_id,
                    exam_id: exam.id,
                    code: "ONCE".into(),
                    max_uses: Some(1),
                    uses: 0,
                    is_active: true,
                    created_at: Utc::now(),
                })
                .await;

            assert!(store.redeem_code(exam.id, "ONCE".into()).await.unwrap().is_some());
            store.release_code(code_id).await.unwrap();
            store.release_code(code_id).await.unwrap();
            assert!(store.redeem_code(exam.id, "ONCE".into()).await.unwrap().is_some());
            assert!(store.redeem_code(exam.id, "ONCE".into()).await.unwrap().is_none());
        });
    }

    #[test]
    fn code_redemption_respects_max_uses() {
        tokio_test::block_on(async {
            let store = MemoryAttemptStore::new();
            let exam = exam();
            store.put_exam(exam.clone()).await;
            store
                .put_code(ExamCode {
                    id: Uuid::new_v4(),
                    exam_id: exam.id,
                    code: "ABC123".into(),
                    max_uses: Some(1),
                    uses: 0,
                    is_active: true,
                    created_at: Utc::now(),
                })
                .await;

            assert!(store.redeem_code(exam.id, "ABC123".into()).await.unwrap().is_some());
            assert!(store.redeem_code(exam.id, "ABC123".into()).await.unwrap().is_none());
            assert!(store.redeem_code(Uuid::new_v4(), "ABC123".into()).await.unwrap().is_none());
        });
    }
}
