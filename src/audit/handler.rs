//! The audit execution core shared by the one-shot and continuous handlers.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::model::CollectorManager;
use crate::notifications::Notifier;
use crate::solution::Solution;
use crate::strategies::{self, StrategyRegistry};

use super::applier::{Applier, ApplyReport};
use super::store::AuditStore;
use super::{Audit, AuditState};

/// Result of one audit execution.
#[derive(Debug)]
pub struct AuditOutcome {
    pub audit: Audit,
    pub solution: Option<Solution>,
    pub report: Option<ApplyReport>,
}

impl AuditOutcome {
    fn unchanged(audit: Audit) -> Self {
        Self {
            audit,
            solution: None,
            report: None,
        }
    }
}

pub struct AuditEngine {
    store: Arc<dyn AuditStore>,
    collectors: Arc<CollectorManager>,
    strategies: Arc<StrategyRegistry>,
    applier: Arc<dyn Applier>,
    notifier: Notifier,
}

impl AuditEngine {
    pub fn new(
        store: Arc<dyn AuditStore>,
        collectors: Arc<CollectorManager>,
        strategies: Arc<StrategyRegistry>,
        applier: Arc<dyn Applier>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            collectors,
            strategies,
            applier,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Run `uuid` once: ONGOING, plan, apply, then SUCCEEDED or FAILED.
    ///
    /// Planning and execution failures are recorded on the audit and do not
    /// surface as `Err`. Only store failures do.
    pub async fn execute_audit(&self, uuid: Uuid) -> EngineResult<AuditOutcome> {
        let audit = self.store.get_by_uuid(uuid).await?;
        if audit.is_cancelled() {
            debug!(audit = %uuid, "audit is cancelled, not running");
            return Ok(AuditOutcome::unchanged(audit));
        }
        if audit.state == AuditState::Ongoing {
            warn!(audit = %uuid, "previous run did not finish, running again");
        }

        let audit = self.update_state(uuid, AuditState::Ongoing, None).await?;
        if audit.is_cancelled() {
            return Ok(AuditOutcome::unchanged(audit));
        }

        info!(audit = %uuid, name = %audit.name, goal = %audit.goal, "executing audit");
        match self.plan_and_apply(&audit).await {
            Ok((solution, report)) => {
                let (state, fault) = match report.fault() {
                    None => (AuditState::Succeeded, None),
                    Some(fault) => {
                        error!(audit = %uuid, error = %fault, "applying solution failed");
                        (AuditState::Failed, Some(fault))
                    }
                };
                let audit = self.update_state(uuid, state, fault).await?;
                Ok(AuditOutcome {
                    audit,
                    solution: Some(solution),
                    report: Some(report),
                })
            }
            Err(e) => {
                log_failure(uuid, &e);
                let audit = self
                    .update_state(uuid, AuditState::Failed, Some(e.to_string()))
                    .await?;
                Ok(AuditOutcome::unchanged(audit))
            }
        }
    }

    async fn plan_and_apply(&self, audit: &Audit) -> EngineResult<(Solution, ApplyReport)> {
        audit.validate()?;
        let mut strategy = self
            .strategies
            .select(&audit.goal, audit.strategy.as_deref())?;
        let name = strategy.name();

        self.notifier.strategy_start(audit, name).await;
        let planned = async {
            let collector = self
                .collectors
                .get_cluster_model_collector(strategy.collector())?;
            let model = collector.collect(&audit.scope).await?;
            strategies::execute(strategy.as_mut(), Some(model), &audit.parameters)
        }
        .await;

        let solution = match planned {
            Ok(solution) => {
                self.notifier.strategy_end(audit, name).await;
                solution
            }
            Err(e) => {
                self.notifier.strategy_error(audit, name, &e.to_string()).await;
                return Err(e);
            }
        };

        info!(
            audit = %audit.uuid,
            strategy = name,
            actions = solution.actions().len(),
            "solution planned"
        );
        let report = self.applier.apply(&solution).await?;
        Ok((solution, report))
    }

    /// Reload the audit, move it to `to` and persist. A CANCELLED audit is
    /// returned untouched.
    pub async fn update_state(
        &self,
        uuid: Uuid,
        to: AuditState,
        fault: Option<String>,
    ) -> EngineResult<Audit> {
        let mut audit = self.store.get_by_uuid(uuid).await?;
        if audit.is_cancelled() {
            debug!(audit = %uuid, target = %to, "audit was cancelled, keeping CANCELLED");
            return Ok(audit);
        }

        let old = audit.transition(to)?;
        if to != AuditState::Ongoing {
            audit.last_error = fault;
        }
        if !self.store.save_unless_cancelled(&audit).await? {
            debug!(audit = %uuid, target = %to, "audit cancelled during update");
            return self.store.get_by_uuid(uuid).await;
        }

        self.notifier.audit_update(&audit, old).await;
        Ok(audit)
    }

    /// Mark an audit CANCELLED. Continuous handlers drop it at their next tick.
    pub async fn cancel_audit(&self, uuid: Uuid) -> EngineResult<Audit> {
        let mut audit = self.store.get_by_uuid(uuid).await?;
        if audit.is_cancelled() {
            return Ok(audit);
        }
        let old = audit.transition(AuditState::Cancelled)?;
        self.store.save(&audit).await?;
        self.notifier.audit_update(&audit, old).await;
        info!(audit = %uuid, "audit cancelled");
        Ok(audit)
    }

    /// Validate and store a new audit.
    pub async fn create_audit(&self, audit: Audit) -> EngineResult<Audit> {
        audit.validate()?;
        self.strategies
            .select(&audit.goal, audit.strategy.as_deref())?;
        self.store.save(&audit).await?;
        info!(audit = %audit.uuid, name = %audit.name, audit_type = %audit.audit_type, "audit created");
        Ok(audit)
    }
}

fn log_failure(uuid: Uuid, e: &EngineError) {
    match e.kind() {
        ErrorKind::NoSolution => warn!(audit = %uuid, error = %e, "no solution found"),
        ErrorKind::Validation => warn!(audit = %uuid, error = %e, "audit rejected"),
        ErrorKind::Precondition => warn!(audit = %uuid, error = %e, "cluster model not usable"),
        ErrorKind::Execution | ErrorKind::Scheduler => {
            error!(audit = %uuid, error = %e, "audit failed")
        }
    }
}
