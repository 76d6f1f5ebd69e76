//! Persistence seam for attempts.
//!
//! Every mutating method is a single conditional write: it either applies in
//! full or reports that its guard did not match. Callers classify a failed
//! guard by re-reading the row.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::admin_dto::ExamActivity;
use crate::error::Result;
use crate::models::attempt::{Attempt, CompletionStatus, JsonMap, NewAttempt};
use crate::models::audit_log::NewAuditEntry;
use crate::models::exam::Exam;
use crate::models::exam_code::ExamCode;
use crate::services::grading_service::GradeReport;

pub use memory::MemoryAttemptStore;
pub use postgres::PgAttemptStore;

/// An attempt together with the exam it belongs to.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: Attempt,
    pub exam: Exam,
}

#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub exam_id: Option<Uuid>,
    pub status: Option<CompletionStatus>,
    pub offset: i64,
    pub limit: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn load(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>>;

    /// Merges `answers` key-by-key, replaces `auto_save_data` and bumps the
    /// version, only if the attempt is in progress and still at
    /// `expected_version`. Returns the new version, or `None` when the guard
    /// did not match (including a missing attempt).
    async fn try_save(
        &self,
        attempt_id: Uuid,
        expected_version: i64,
        answers: JsonMap,
        auto_save_data: JsonMap,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>>;

    /// Moves an in-progress attempt to `submitted`. Returns the stamped
    /// `submitted_at` for the one caller that performed the transition.
    async fn try_submit(&self, attempt_id: Uuid, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;

    // Entry flow

    async fn find_exam(&self, exam_id: Uuid) -> Result<Option<Exam>>;

    /// Consumes one use of an active code that belongs to `exam_id`.
    async fn redeem_code(&self, exam_id: Uuid, code: String) -> Result<Option<ExamCode>>;

    /// Returns one use taken by `redeem_code` whose attempt was never created.
    async fn release_code(&self, code_id: Uuid) -> Result<()>;

    async fn insert_attempt(&self, new_attempt: NewAttempt) -> Result<Attempt>;

    // Grading

    /// Leases up to `limit` submitted, ungraded attempts whose retry time has
    /// come, so concurrent workers never grade the same attempt twice.
    async fn claim_ungraded(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<AttemptRecord>>;

    async fn record_grade(&self, attempt_id: Uuid, report: GradeReport, now: DateTime<Utc>) -> Result<()>;

    async fn record_grading_failure(
        &self,
        attempt_id: Uuid,
        error: String,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()>;

    // Housekeeping and monitoring

    /// Closes in-progress attempts not saved since `cutoff`. Returns how many.
    async fn abandon_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn list_attempts(&self, filter: AttemptFilter) -> Result<(Vec<Attempt>, i64)>;

    async fn exam_activity(&self, exam_id: Uuid, live_since: DateTime<Utc>) -> Result<ExamActivity>;

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()>;
}
