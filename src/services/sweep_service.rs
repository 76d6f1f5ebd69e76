use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::AttemptStore;
use crate::utils::time::now;

/// Closes in-progress attempts that stopped saving. The write is guarded on
/// `in_progress`, so it can never undo a submission.
#[derive(Clone)]
pub struct SweepService {
    store: Arc<dyn AttemptStore>,
    inactivity: chrono::Duration,
}

impl SweepService {
    pub fn new(store: Arc<dyn AttemptStore>, inactivity: chrono::Duration) -> Self {
        Self { store, inactivity }
    }

    pub async fn run_at(&self, at: DateTime<Utc>) -> Result<u64> {
        let closed = self.store.abandon_inactive(at - self.inactivity).await?;
        if closed > 0 {
            tracing::info!(closed, "inactive attempts marked abandoned");
        }
        Ok(closed)
    }

    pub async fn run(self, every: Duration) {
        loop {
            if let Err(e) = self.run_at(now()).await {
                tracing::error!("Abandonment sweep error: {:?}", e);
            }
            tokio::time::sleep(every).await;
        }
    }
}
