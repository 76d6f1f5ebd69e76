use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::dto::admin_dto::ExamActivity;
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, JsonMap, NewAttempt};
use crate::models::audit_log::NewAuditEntry;
use crate::models::exam::Exam;
use crate::models::exam_code::ExamCode;
use crate::services::grading_service::GradeReport;
use crate::store::{AttemptFilter, AttemptRecord, AttemptStore};

const EXAM_COLUMNS: &str = "id, title, description, duration_minutes, display_mode, shuffle_questions, \
     access_mode, allowed_ip_ranges, passing_score, is_active, questions, created_at, updated_at";

#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exam_by_id(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        let exam = sqlx::query_as::<_, Exam>(&format!(
            "SELECT {} FROM exams WHERE id = $1",
            EXAM_COLUMNS
        ))
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exam)
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn load(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>> {
        let attempt = sqlx::query_as::<_, Attempt>(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(attempt) = attempt else { return Ok(None) };

        let exam = self
            .exam_by_id(attempt.exam_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Attempt {} references a missing exam", attempt.id)))?;

        Ok(Some(AttemptRecord { attempt, exam }))
    }

    async fn try_save(
        &self,
        attempt_id: Uuid,
        expected_version: i64,
        answers: JsonMap,
        auto_save_data: JsonMap,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        // jsonb `||` on two objects is a top-level key merge: new keys are
        // added, existing keys are overwritten, nested values are not merged.
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE attempts
            SET answers = answers || $3::jsonb,
                auto_save_data = $4::jsonb,
                version = version + 1,
                last_saved_at = $5
            WHERE id = $1
              AND version = $2
              AND completion_status = 'in_progress'
            RETURNING version
            "#,
        )
        .bind(attempt_id)
        .bind(expected_version)
        .bind(Json(answers))
        .bind(Json(auto_save_data))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(new_version)
    }

    async fn try_submit(&self, attempt_id: Uuid, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let submitted_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE attempts
            SET completion_status = 'submitted',
                submitted_at = $2,
                next_grading_at = $2
            WHERE id = $1 AND completion_status = 'in_progress'
            RETURNING submitted_at
            "#,
        )
        .bind(attempt_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(submitted_at)
    }

    async fn find_exam(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        self.exam_by_id(exam_id).await
    }

    async fn redeem_code(&self, exam_id: Uuid, code: String) -> Result<Option<ExamCode>> {
        let redeemed = sqlx::query_as::<_, ExamCode>(
            r#"
            UPDATE exam_codes
            SET uses = uses + 1
            WHERE exam_id = $1
              AND code = $2
              AND is_active = TRUE
              AND (max_uses IS NULL OR uses < max_uses)
            RETURNING *
            "#,
        )
        .bind(exam_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(redeemed)
    }

    async fn release_code(&self, code_id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE exam_codes SET uses = uses - 1 WHERE id = $1 AND uses > 0"#)
            .bind(code_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_attempt(&self, new_attempt: NewAttempt) -> Result<Attempt> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            INSERT INTO attempts (
                exam_id, student_id, code_id, started_at, completion_status,
                answers, auto_save_data, version, last_saved_at, client_ip
            ) VALUES (
                $1, $2, $3, $4, 'in_progress',
                '{}'::jsonb, '{}'::jsonb, 1, $4, $5
            )
            RETURNING *
            "#,
        )
        .bind(new_attempt.exam_id)
        .bind(new_attempt.student_id)
        .bind(new_attempt.code_id)
        .bind(new_attempt.started_at)
        .bind(new_attempt.client_ip)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn claim_ungraded(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<AttemptRecord>> {
        let claimed = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts SET next_grading_at = $2
            WHERE id IN (
                SELECT id FROM attempts
                WHERE completion_status = 'submitted'
                  AND graded_at IS NULL
                  AND grading_attempts < $3
                  AND (next_grading_at IS NULL OR next_grading_at <= $1)
                ORDER BY submitted_at ASC
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(lease_until)
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(claimed.len());
        for attempt in claimed {
            match self.exam_by_id(attempt.exam_id).await? {
                Some(exam) => records.push(AttemptRecord { attempt, exam }),
                None => tracing::warn!(attempt_id = %attempt.id, "claimed attempt references a missing exam"),
            }
        }
        Ok(records)
    }

    async fn record_grade(&self, attempt_id: Uuid, report: GradeReport, now: DateTime<Utc>) -> Result<()> {
        let graded_answers = serde_json::to_value(&report.answers)?;
        sqlx::query(
            r#"
            UPDATE attempts
            SET score = $2, max_score = $3, needs_review = $4, graded_answers = $5,
                graded_at = $6, grading_error = NULL, next_grading_at = NULL
            WHERE id = $1 AND graded_at IS NULL
            "#,
        )
        .bind(attempt_id)
        .bind(Decimal::from(report.score))
        .bind(Decimal::from(report.max_score))
        .bind(report.needs_review)
        .bind(graded_answers)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_grading_failure(
        &self,
        attempt_id: Uuid,
        error: String,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE attempts
            SET grading_attempts = grading_attempts + 1, grading_error = $2, next_grading_at = $3
            WHERE id = $1 AND graded_at IS NULL
            "#,
        )
        .bind(attempt_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn abandon_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET completion_status = 'abandoned'
            WHERE completion_status = 'in_progress' AND last_saved_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_attempts(&self, filter: AttemptFilter) -> Result<(Vec<Attempt>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, Attempt>(
            r#"
            SELECT * FROM attempts
            WHERE ($1::uuid IS NULL OR exam_id = $1)
              AND ($2::text IS NULL OR completion_status = $2)
            ORDER BY started_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.exam_id)
        .bind(status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM attempts
            WHERE ($1::uuid IS NULL OR exam_id = $1)
              AND ($2::text IS NULL OR completion_status = $2)
            "#,
        )
        .bind(filter.exam_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn exam_activity(&self, exam_id: Uuid, live_since: DateTime<Utc>) -> Result<ExamActivity> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE completion_status = 'in_progress') AS in_progress,
                COUNT(*) FILTER (WHERE completion_status = 'submitted') AS submitted,
                COUNT(*) FILTER (WHERE completion_status = 'abandoned') AS abandoned,
                COUNT(*) FILTER (WHERE completion_status = 'in_progress' AND last_saved_at >= $2) AS live,
                COUNT(*) FILTER (WHERE completion_status = 'submitted' AND graded_at IS NULL) AS awaiting_grading
            FROM attempts
            WHERE exam_id = $1
            "#,
        )
        .bind(exam_id)
        .bind(live_since)
        .fetch_one(&self.pool)
        .await?;

        Ok(ExamActivity {
            exam_id,
            in_progress: row.try_get("in_progress")?,
            submitted: row.try_get("submitted")?,
            abandoned: row.try_get("abandoned")?,
            live: row.try_get("live")?,
            awaiting_grading: row.try_get("awaiting_grading")?,
        })
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (actor, action, entity_type, entity_id, changes)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.actor)
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.changes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
