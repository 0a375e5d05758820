use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

use super::handler::{AuditEngine, AuditOutcome};
use super::{Audit, AuditType};

/// Runs ONESHOT audits on direct invocation; the caller awaits the outcome.
pub struct OneShotAuditHandler {
    engine: Arc<AuditEngine>,
}

impl OneShotAuditHandler {
    pub fn new(engine: Arc<AuditEngine>) -> Self {
        Self { engine }
    }

    pub async fn launch_audit(&self, uuid: Uuid) -> EngineResult<AuditOutcome> {
        let audit = self.engine.store().get_by_uuid(uuid).await?;
        if audit.audit_type != AuditType::Oneshot {
            return Err(EngineError::InvalidAudit {
                uuid,
                reason: "continuous audits are run by the scheduler".to_string(),
            });
        }
        let outcome = self.engine.execute_audit(uuid).await?;
        info!(audit = %uuid, state = %outcome.audit.state, "one-shot audit finished");
        Ok(outcome)
    }

    /// Store `audit` and run it straight away.
    pub async fn create_and_launch(&self, audit: Audit) -> EngineResult<AuditOutcome> {
        let audit = self.engine.create_audit(audit).await?;
        self.launch_audit(audit.uuid).await
    }
}
