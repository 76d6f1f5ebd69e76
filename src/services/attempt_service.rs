use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde_json::json;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::dto::public_dto::{
    AttemptState, ExamSummary, SaveAnswersRequest, SaveAnswersResponse, SubmitAttemptResponse,
};
use crate::error::{Error, Result};
use crate::models::attempt::CompletionStatus;
use crate::models::question::{PublicQuestion, Question};
use crate::services::audit_service::AuditService;
use crate::services::draft::AutosavePolicy;
use crate::store::{AttemptRecord, AttemptStore};
use crate::utils::time::{now, seconds_remaining};

/// Owns the attempt lifecycle after entry: state reads, versioned autosave
/// and exactly-once submission.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    autosave: AutosavePolicy,
    grading_signal: Arc<Notify>,
    audit: AuditService,
}

impl AttemptService {
    pub fn new(store: Arc<dyn AttemptStore>, autosave: AutosavePolicy, grading_signal: Arc<Notify>) -> Self {
        let audit = AuditService::new(store.clone());
        Self {
            store,
            autosave,
            grading_signal,
            audit,
        }
    }

    pub async fn get_state(&self, attempt_id: Uuid) -> Result<AttemptState> {
        let record = self.load(attempt_id).await?;
        self.build_state(&record, now())
    }

    pub async fn save(&self, attempt_id: Uuid, req: SaveAnswersRequest) -> Result<SaveAnswersResponse> {
        let expected_version = req.expected_version;
        let saved_at = now();

        let written = self
            .store
            .try_save(attempt_id, expected_version, req.answers, req.auto_save_data, saved_at)
            .await?;

        match written {
            Some(new_version) => {
                tracing::debug!(%attempt_id, new_version, "answers saved");
                Ok(SaveAnswersResponse { new_version, saved_at })
            }
            None => Err(self.explain_rejected_save(attempt_id, expected_version).await),
        }
    }

    /// Finalizes the attempt. Safe to repeat and to race: exactly one caller
    /// performs the transition, every other caller gets the same
    /// `submitted_at` back with `already_submitted = true`.
    pub async fn submit(&self, attempt_id: Uuid) -> Result<SubmitAttemptResponse> {
        if let Some(submitted_at) = self.store.try_submit(attempt_id, now()).await? {
            tracing::info!(%attempt_id, %submitted_at, "attempt submitted");
            // Grading happens on the worker; a failure there never reaches the student.
            self.grading_signal.notify_one();
            self.audit
                .log_best_effort(
                    None,
                    "submit_attempt",
                    "attempt",
                    attempt_id,
                    Some(json!({ "submitted_at": submitted_at })),
                )
                .await;
            return Ok(SubmitAttemptResponse {
                ok: true,
                attempt_id,
                submitted_at,
                already_submitted: false,
            });
        }

        let record = self.load(attempt_id).await?;
        match record.attempt.completion_status {
            CompletionStatus::Submitted => {
                let submitted_at = record.attempt.submitted_at.ok_or_else(|| {
                    Error::Internal(format!("Submitted attempt {} has no submitted_at", attempt_id))
                })?;
                tracing::info!(%attempt_id, "duplicate submit acknowledged");
                Ok(SubmitAttemptResponse {
                    ok: true,
                    attempt_id,
                    submitted_at,
                    already_submitted: true,
                })
            }
            CompletionStatus::Abandoned => Err(Error::AttemptAbandoned),
            CompletionStatus::InProgress => Err(Error::Internal(format!(
                "Submit guard rejected in-progress attempt {}",
                attempt_id
            ))),
        }
    }

    async fn load(&self, attempt_id: Uuid) -> Result<AttemptRecord> {
        self.store
            .load(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    /// A guarded save matched nothing; re-read the row to say why.
    /// Submission takes precedence over a version mismatch.
    async fn explain_rejected_save(&self, attempt_id: Uuid, expected_version: i64) -> Error {
        let record = match self.load(attempt_id).await {
            Ok(record) => record,
            Err(e) => return e,
        };

        match record.attempt.completion_status {
            CompletionStatus::Submitted => Error::AttemptSubmitted,
            CompletionStatus::Abandoned => Error::AttemptAbandoned,
            // The version may already have moved to `expected_version` through a
            // concurrent save; the write was still rejected against a stale row.
            CompletionStatus::InProgress => {
                tracing::info!(
                    %attempt_id,
                    expected_version,
                    current_version = record.attempt.version,
                    "save rejected: version conflict"
                );
                match self.build_state(&record, now()) {
                    Ok(current) => Error::VersionConflict {
                        current: Box::new(current),
                    },
                    Err(e) => e,
                }
            }
        }
    }

    fn build_state(&self, record: &AttemptRecord, at: DateTime<Utc>) -> Result<AttemptState> {
        let AttemptRecord { attempt, exam } = record;
        let questions = display_order(exam.question_list()?, attempt.id, exam.shuffle_questions);

        let time_remaining_seconds = (attempt.completion_status == CompletionStatus::InProgress)
            .then(|| seconds_remaining(attempt.started_at, exam.duration_minutes, at));

        Ok(AttemptState {
            attempt_id: attempt.id,
            exam: ExamSummary {
                id: exam.id,
                title: exam.title.clone(),
                description: exam.description.clone(),
                duration_minutes: exam.duration_minutes,
                display_mode: exam.display_mode,
                total_questions: questions.len(),
                passing_score: exam.passing_score.to_string().parse::<f64>().unwrap_or(0.0),
            },
            questions,
            answers: attempt.answers.0.clone(),
            auto_save_data: attempt.auto_save_data.0.clone(),
            version: attempt.version,
            completion_status: attempt.completion_status,
            started_at: attempt.started_at,
            submitted_at: attempt.submitted_at,
            time_remaining_seconds,
            autosave: self.autosave.hints(),
        })
    }
}

/// Exam order by `position`, or a shuffle seeded by the attempt id so the
/// same attempt sees the same order on every reload.
pub fn display_order(mut questions: Vec<Question>, attempt_id: Uuid, shuffle: bool) -> Vec<PublicQuestion> {
    questions.sort_by_key(|q| q.position);
    if shuffle {
        let bits = attempt_id.as_u128();
        let mut rng = StdRng::seed_from_u64((bits as u64) ^ ((bits >> 64) as u64));
        questions.shuffle(&mut rng);
    }
    questions.iter().map(PublicQuestion::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::Attempt;
    use crate::models::exam::{AccessMode, DisplayMode, Exam};
    use crate::store::MockAttemptStore;
    use rust_decimal::Decimal;
    use serde_json::Value as JsonValue;
    use sqlx::types::Json;

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": format!("q{}", i),
                    "type": "single_choice",
                    "prompt": format!("Question {}", i),
                    "options": ["a", "b"],
                    "correct": 0,
                    "position": i as i32,
                }))
                .unwrap()
            })
            .collect()
    }

    fn record(status: CompletionStatus, version: i64) -> AttemptRecord {
        let exam_id = Uuid::new_v4();
        let started_at = Utc::now();
        AttemptRecord {
            attempt: Attempt {
                id: Uuid::new_v4(),
                exam_id,
                student_id: None,
                code_id: None,
                started_at,
                submitted_at: (status == CompletionStatus::Submitted).then_some(started_at),
                completion_status: status,
                answers: Json(Default::default()),
                auto_save_data: Json(Default::default()),
                version,
                last_saved_at: started_at,
                client_ip: None,
                score: None,
                max_score: None,
                needs_review: None,
                graded_answers: None,
                graded_at: None,
                grading_attempts: 0,
                grading_error: None,
                next_grading_at: None,
            },
            exam: Exam {
                id: exam_id,
                title: "Chemistry".into(),
                description: None,
                duration_minutes: 45,
                display_mode: DisplayMode::OnePerPage,
                shuffle_questions: false,
                access_mode: AccessMode::Open,
                allowed_ip_ranges: Vec::new(),
                passing_score: Decimal::from(60),
                is_active: true,
                questions: serde_json::to_value(questions(2)).unwrap(),
                created_at: started_at,
                updated_at: started_at,
            },
        }
    }

    fn service(store: MockAttemptStore) -> AttemptService {
        AttemptService::new(Arc::new(store), AutosavePolicy::default(), Arc::new(Notify::new()))
    }

    #[test]
    fn shuffle_is_stable_per_attempt() {
        let attempt_id = Uuid::new_v4();
        let first = display_order(questions(12), attempt_id, true);
        let second = display_order(questions(12), attempt_id, true);
        assert_eq!(first, second);
        assert_eq!(first.len(), 12);

        let unshuffled: Vec<String> = display_order(questions(12), attempt_id, false)
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(unshuffled, (0..12).map(|i| format!("q{}", i)).collect::<Vec<_>>());
    }

    #[test]
    fn public_questions_hide_the_answer_key() {
        let shown = display_order(questions(1), Uuid::new_v4(), false);
        let value: JsonValue = serde_json::to_value(&shown[0]).unwrap();
        assert!(value.get("correct").is_none());
    }

    #[tokio::test]
    async fn rejected_save_on_submitted_attempt_reports_submission() {
        let rec = record(CompletionStatus::Submitted, 5);
        let id = rec.attempt.id;
        let mut store = MockAttemptStore::new();
        store.expect_try_save().returning(|_, _, _, _, _| Ok(None));
        store.expect_load().returning(move |_| Ok(Some(rec.clone())));

        let err = service(store)
            .save(
                id,
                SaveAnswersRequest {
                    answers: Default::default(),
                    auto_save_data: Default::default(),
                    expected_version: 5,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AttemptSubmitted));
    }

    #[tokio::test]
    async fn rejected_save_on_stale_version_carries_current_state() {
        let rec = record(CompletionStatus::InProgress, 3);
        let id = rec.attempt.id;
        let mut store = MockAttemptStore::new();
        store.expect_try_save().returning(|_, _, _, _, _| Ok(None));
        store.expect_load().returning(move |_| Ok(Some(rec.clone())));

        let err = service(store)
            .save(
                id,
                SaveAnswersRequest {
                    answers: Default::default(),
                    auto_save_data: Default::default(),
                    expected_version: 2,
                },
            )
            .await
            .unwrap_err();
        match err {
            Error::VersionConflict { current } => {
                assert_eq!(current.version, 3);
                assert_eq!(current.questions.len(), 2);
                assert_eq!(current.time_remaining_seconds.map(|s| s > 0), Some(true));
            }
            other => panic!("expected version conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejected_save_reread_at_expected_version_is_still_a_conflict() {
        // Client sent a version from the future; another save caught up
        // before the re-read.
        let rec = record(CompletionStatus::InProgress, 4);
        let id = rec.attempt.id;
        let mut store = MockAttemptStore::new();
        store.expect_try_save().returning(|_, _, _, _, _| Ok(None));
        store.expect_load().returning(move |_| Ok(Some(rec.clone())));

        let err = service(store)
            .save(
                id,
                SaveAnswersRequest {
                    answers: Default::default(),
                    auto_save_data: Default::default(),
                    expected_version: 4,
                },
            )
            .await
            .unwrap_err();
        match err {
            Error::VersionConflict { current } => assert_eq!(current.version, 4),
            other => panic!("expected version conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_attempt_is_not_found() {
        let mut store = MockAttemptStore::new();
        store.expect_try_submit().returning(|_, _| Ok(None));
        store.expect_load().returning(|_| Ok(None));

        let err = service(store).submit(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_submit() {
        let mut store = MockAttemptStore::new();
        store.expect_try_submit().returning(|_, at| Ok(Some(at)));
        store
            .expect_append_audit()
            .returning(|_| Err(Error::Internal("audit table unavailable".into())));

        let resp = service(store).submit(Uuid::new_v4()).await.unwrap();
        assert!(resp.ok);
        assert!(!resp.already_submitted);
    }
}
