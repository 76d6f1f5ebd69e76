use std::net::IpAddr;
use std::sync::Arc;

use serde_json::json;
use sqlx::types::ipnetwork::IpNetwork;
use uuid::Uuid;

use crate::dto::public_dto::{AccessRequest, CreateAttemptResponse};
use crate::error::{Error, Result};
use crate::models::attempt::NewAttempt;
use crate::models::exam::{AccessMode, Exam};
use crate::services::audit_service::AuditService;
use crate::store::AttemptStore;
use crate::utils::time::now;

/// Creates attempt rows for each access mode. The session manager never
/// creates attempts itself; it only needs `exam_id` and the identity
/// reference this service records.
#[derive(Clone)]
pub struct EntryService {
    store: Arc<dyn AttemptStore>,
    audit: AuditService,
}

impl EntryService {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        let audit = AuditService::new(store.clone());
        Self { store, audit }
    }

    pub async fn start_attempt(
        &self,
        exam_id: Uuid,
        access: AccessRequest,
        client_ip: Option<IpAddr>,
    ) -> Result<CreateAttemptResponse> {
        let exam = self
            .store
            .find_exam(exam_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Exam {} not found", exam_id)))?;

        if !exam.is_active {
            return Err(Error::Forbidden("This exam is not accepting attempts".to_string()));
        }

        let (student_id, code_id) = match (exam.access_mode, access) {
            (AccessMode::Open, AccessRequest::Open { student_id }) => (student_id, None),
            (AccessMode::Code, AccessRequest::Code { code }) => {
                let redeemed = self
                    .store
                    .redeem_code(exam.id, code.trim().to_string())
                    .await?
                    .ok_or_else(|| Error::Forbidden("Invalid or exhausted exam code".to_string()))?;
                (None, Some(redeemed.id))
            }
            (AccessMode::IpRestricted, AccessRequest::Ip { student_id }) => {
                ensure_ip_allowed(&exam, client_ip)?;
                (student_id, None)
            }
            (mode, _) => {
                return Err(Error::BadRequest(format!(
                    "This exam requires '{}' access",
                    mode.as_str()
                )))
            }
        };

        let inserted = self
            .store
            .insert_attempt(NewAttempt {
                exam_id: exam.id,
                student_id,
                code_id,
                started_at: now(),
                client_ip: client_ip.map(IpNetwork::from),
            })
            .await;
        let attempt = match inserted {
            Ok(attempt) => attempt,
            Err(e) => {
                if let Some(code_id) = code_id {
                    if let Err(release_err) = self.store.release_code(code_id).await {
                        tracing::error!(%code_id, error = ?release_err, "Failed to release exam code use");
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %exam.id,
            access_mode = exam.access_mode.as_str(),
            "attempt started"
        );
        self.audit
            .log_best_effort(
                student_id.map(|id| id.to_string()),
                "start_attempt",
                "attempt",
                attempt.id,
                Some(json!({ "exam_id": exam.id, "access_mode": exam.access_mode.as_str() })),
            )
            .await;

        Ok(CreateAttemptResponse {
            attempt_id: attempt.id,
            started_at: attempt.started_at,
            version: attempt.version,
        })
    }
}

fn ensure_ip_allowed(exam: &Exam, client_ip: Option<IpAddr>) -> Result<()> {
    let ip = client_ip.ok_or_else(|| Error::Forbidden("Client address could not be determined".to_string()))?;
    if exam.allowed_ip_ranges.iter().any(|range| range.contains(ip)) {
        Ok(())
    } else {
        tracing::warn!(exam_id = %exam.id, %ip, "attempt refused: address outside allowed ranges");
        Err(Error::Forbidden("Your network is not allowed to take this exam".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::DisplayMode;
    use crate::models::exam_code::ExamCode;
    use crate::store::MockAttemptStore;
    use chrono::Utc;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    fn exam(access_mode: AccessMode) -> Exam {
        Exam {
            id: Uuid::new_v4(),
            title: "Biology".into(),
            description: None,
            duration_minutes: 20,
            display_mode: DisplayMode::AllAtOnce,
            shuffle_questions: false,
            access_mode,
            allowed_ip_ranges: vec!["10.20.0.0/16".parse().unwrap()],
            passing_score: Decimal::from(50),
            is_active: true,
            questions: json!([]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failed_insert_gives_the_code_use_back() {
        let exam = exam(AccessMode::Code);
        let code_id = Uuid::new_v4();
        let exam_id = exam.id;

        let mut store = MockAttemptStore::new();
        store.expect_find_exam().returning(move |_| Ok(Some(exam.clone())));
        store.expect_redeem_code().returning(move |_, code| {
            Ok(Some(ExamCode {
                id: code_id,
                exam_id,
                code,
                max_uses: Some(1),
                uses: 1,
                is_active: true,
                created_at: Utc::now(),
            }))
        });
        store
            .expect_insert_attempt()
            .returning(|_| Err(Error::Internal("connection reset".into())));
        store
            .expect_release_code()
            .with(eq(code_id))
            .times(1)
            .returning(|_| Ok(()));

        let err = EntryService::new(Arc::new(store))
            .start_attempt(exam_id, AccessRequest::Code { code: "BIO".into() }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn missing_client_address_fails_ip_restriction() {
        let exam = exam(AccessMode::IpRestricted);
        let exam_id = exam.id;
        let mut store = MockAttemptStore::new();
        store.expect_find_exam().returning(move |_| Ok(Some(exam.clone())));

        let err = EntryService::new(Arc::new(store))
            .start_attempt(exam_id, AccessRequest::Ip { student_id: None }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
