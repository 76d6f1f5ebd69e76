use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::error::Result;
use crate::services::grading_service::{GradeReport, GradingService};
use crate::store::{AttemptRecord, AttemptStore};
use crate::utils::time::now;

const BATCH_SIZE: i64 = 20;

/// Grades submitted attempts out-of-band, retrying failures with backoff.
#[derive(Clone)]
pub struct GradingWorker {
    store: Arc<dyn AttemptStore>,
    signal: Arc<Notify>,
    max_attempts: i32,
    lease: chrono::Duration,
}

impl GradingWorker {
    pub fn new(store: Arc<dyn AttemptStore>, signal: Arc<Notify>, max_attempts: i32) -> Self {
        Self {
            store,
            signal,
            max_attempts,
            lease: chrono::Duration::minutes(5),
        }
    }

    /// Returns `true` when a batch was claimed.
    pub async fn run_once(&self) -> Result<bool> {
        self.run_at(now()).await
    }

    pub async fn run_at(&self, at: DateTime<Utc>) -> Result<bool> {
        let claimed = self
            .store
            .claim_ungraded(at, at + self.lease, self.max_attempts, BATCH_SIZE)
            .await?;
        if claimed.is_empty() {
            return Ok(false);
        }

        for record in claimed {
            let attempt_id = record.attempt.id;
            let outcome = match grade(&record) {
                Ok(report) => {
                    let (score, max_score) = (report.score, report.max_score);
                    self.store
                        .record_grade(attempt_id, report, at)
                        .await
                        .map(|_| (score, max_score))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok((score, max_score)) => {
                    tracing::info!(%attempt_id, score, max_score, "attempt graded");
                }
                Err(e) => {
                    let failures = record.attempt.grading_attempts + 1;
                    let next_retry_at = at + retry_delay(failures);
                    tracing::warn!(%attempt_id, failures, error = ?e, %next_retry_at, "grading failed");
                    if let Err(e) = self
                        .store
                        .record_grading_failure(attempt_id, e.to_string(), next_retry_at)
                        .await
                    {
                        tracing::error!(%attempt_id, error = ?e, "Failed to record grading failure");
                    }
                }
            }
        }

        Ok(true)
    }

    /// Polls forever. A submit wakes the loop early instead of waiting out
    /// the idle sleep.
    pub async fn run(self) {
        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = self.signal.notified() => {}
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Grading worker error");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }
}

fn grade(record: &AttemptRecord) -> Result<GradeReport> {
    let questions = record.exam.question_list()?;
    Ok(GradingService::grade(&questions, &record.attempt.answers.0))
}

/// 30s doubling per failure, capped at one hour.
pub fn retry_delay(failures: i32) -> chrono::Duration {
    let exponent = (failures.max(1) - 1).min(7) as u32;
    chrono::Duration::seconds((30i64 * 2i64.pow(exponent)).min(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay(1), chrono::Duration::seconds(30));
        assert_eq!(retry_delay(2), chrono::Duration::seconds(60));
        assert_eq!(retry_delay(4), chrono::Duration::seconds(240));
        assert_eq!(retry_delay(8), chrono::Duration::seconds(3600));
        assert_eq!(retry_delay(40), chrono::Duration::seconds(3600));
    }
}
