use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::audit_log::NewAuditEntry;
use crate::store::AttemptStore;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AttemptStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub async fn log(
        &self,
        actor: Option<String>,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: Option<JsonValue>,
    ) -> Result<()> {
        self.store
            .append_audit(NewAuditEntry {
                actor,
                action: action.to_string(),
                entity_type: entity_type.to_string(),
                entity_id,
                changes,
            })
            .await
    }

    /// Audit writes never fail the operation they describe.
    pub async fn log_best_effort(
        &self,
        actor: Option<String>,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: Option<JsonValue>,
    ) {
        if let Err(e) = self.log(actor, action, entity_type, entity_id, changes).await {
            tracing::error!(error = ?e, action, %entity_id, "Failed to write audit log");
        }
    }
}
