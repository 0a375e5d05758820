//! Appliers turn a solution into infrastructure calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::actions::{Action, ActionRegistry};
use crate::error::{EngineError, EngineResult};
use crate::infra::InfraClient;
use crate::solution::Solution;

/// What happened while applying one solution.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub planned: usize,
    pub executed: usize,
    pub reverted: usize,
    pub revert_failures: Vec<String>,
    /// The error that stopped execution, if any.
    pub failure: Option<EngineError>,
}

impl ApplyReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Failure text recorded on the audit, revert problems included.
    pub fn fault(&self) -> Option<String> {
        let failure = self.failure.as_ref()?;
        if self.revert_failures.is_empty() {
            Some(failure.to_string())
        } else {
            Some(format!(
                "{failure} (revert incomplete: {})",
                self.revert_failures.join("; ")
            ))
        }
    }
}

#[async_trait]
pub trait Applier: Send + Sync {
    /// Validation errors are returned as `Err` before any external effect.
    /// Execution failures are reported through [`ApplyReport::failure`].
    async fn apply(&self, solution: &Solution) -> EngineResult<ApplyReport>;
}

fn build_all(registry: &ActionRegistry, solution: &Solution) -> EngineResult<Vec<Box<dyn Action>>> {
    solution
        .actions()
        .iter()
        .map(|planned| {
            let action = registry.build(planned)?;
            action.validate_parameters()?;
            Ok(action)
        })
        .collect()
}

/// Executes actions in list order; on failure, reverts what already ran in
/// reverse order.
pub struct DefaultApplier {
    registry: ActionRegistry,
    client: Arc<dyn InfraClient>,
}

impl DefaultApplier {
    pub fn new(client: Arc<dyn InfraClient>) -> Self {
        Self::with_registry(ActionRegistry::default(), client)
    }

    pub fn with_registry(registry: ActionRegistry, client: Arc<dyn InfraClient>) -> Self {
        Self { registry, client }
    }

    async fn run_one(&self, action: &dyn Action) -> (bool, EngineResult<()>) {
        if let Err(e) = action.pre_condition().await {
            return (false, Err(e));
        }
        if let Err(e) = action.execute(self.client.as_ref()).await {
            return (false, Err(e));
        }
        (true, action.post_condition().await)
    }

    async fn revert(&self, done: &[Box<dyn Action>], report: &mut ApplyReport) {
        for action in done.iter().rev() {
            match action.revert(self.client.as_ref()).await {
                Ok(()) => report.reverted += 1,
                Err(e) => {
                    warn!(
                        action = action.action_type(),
                        resource = action.resource_id(),
                        error = %e,
                        "revert failed"
                    );
                    report.revert_failures.push(e.to_string());
                }
            }
        }
    }
}

#[async_trait]
impl Applier for DefaultApplier {
    async fn apply(&self, solution: &Solution) -> EngineResult<ApplyReport> {
        let actions = build_all(&self.registry, solution)?;
        let mut report = ApplyReport {
            planned: actions.len(),
            ..ApplyReport::default()
        };

        for (index, action) in actions.iter().enumerate() {
            let (executed, result) = self.run_one(action.as_ref()).await;
            if executed {
                report.executed += 1;
            }
            if let Err(e) = result {
                warn!(
                    action = action.action_type(),
                    resource = action.resource_id(),
                    error = %e,
                    "action failed, reverting"
                );
                let done = if executed { index + 1 } else { index };
                self.revert(&actions[..done], &mut report).await;
                report.failure = Some(e);
                return Ok(report);
            }
        }

        info!(
            strategy = %solution.strategy,
            actions = report.executed,
            "solution applied"
        );
        Ok(report)
    }
}

/// Validates the plan and stops there.
pub struct PlanOnlyApplier {
    registry: ActionRegistry,
}

impl Default for PlanOnlyApplier {
    fn default() -> Self {
        Self {
            registry: ActionRegistry::default(),
        }
    }
}

#[async_trait]
impl Applier for PlanOnlyApplier {
    async fn apply(&self, solution: &Solution) -> EngineResult<ApplyReport> {
        let actions = build_all(&self.registry, solution)?;
        info!(
            strategy = %solution.strategy,
            actions = actions.len(),
            "solution validated, not applied"
        );
        Ok(ApplyReport {
            planned: actions.len(),
            ..ApplyReport::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ChangeNodePowerState, ChangeNodeServiceState, Migrate, Parameters};
    use crate::infra::{InfraCall, MigrationType, PowerState, RecordingClient};
    use crate::model::ServiceStatus;

    fn plan() -> Solution {
        let mut solution = Solution::new("test");
        solution.add_action(
            "change_node_service_state",
            "b",
            ChangeNodeServiceState::parameters(ServiceStatus::Disabled, ServiceStatus::Enabled),
        );
        solution.add_action("migrate", "vm-1", Migrate::parameters(MigrationType::Live, "a", "b"));
        solution.add_action("change_node_power_state", "a", ChangeNodePowerState::parameters(PowerState::Off));
        solution
    }

    #[tokio::test]
    async fn executes_in_order() {
        let client = Arc::new(RecordingClient::new());
        let applier = DefaultApplier::new(client.clone());
        let report = applier.apply(&plan()).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.executed, 3);

        let calls = client.calls().await;
        assert!(matches!(calls[0], InfraCall::Enable { .. }));
        assert!(matches!(calls[1], InfraCall::Migrate { .. }));
        assert!(matches!(calls[2], InfraCall::Power { .. }));
    }

    #[tokio::test]
    async fn failure_reverts_in_reverse_order() {
        let client = Arc::new(RecordingClient::new());
        client
            .fail_when(|call| matches!(call, InfraCall::Power { .. }))
            .await;
        let applier = DefaultApplier::new(client.clone());

        let report = applier.apply(&plan()).await.unwrap();
        assert!(matches!(report.failure, Some(EngineError::ActionExecution { .. })));
        assert_eq!(report.executed, 2);
        assert_eq!(report.reverted, 2);

        let calls = client.calls().await;
        // enable, migrate, failed power, then migrate back and disable
        assert_eq!(calls.len(), 5);
        assert_eq!(
            calls[3],
            InfraCall::Migrate {
                instance: "vm-1".into(),
                source: "b".into(),
                destination: "a".into(),
                migration_type: MigrationType::Live,
            }
        );
        assert!(matches!(calls[4], InfraCall::Disable { .. }));
    }

    #[tokio::test]
    async fn revert_failures_are_recorded_not_raised() {
        let client = Arc::new(RecordingClient::new());
        client
            .fail_when(|call| {
                matches!(call, InfraCall::Power { .. })
                    || matches!(call, InfraCall::Migrate { source, .. } if source == "b")
            })
            .await;
        let applier = DefaultApplier::new(client.clone());

        let report = applier.apply(&plan()).await.unwrap();
        assert_eq!(report.reverted, 1);
        assert_eq!(report.revert_failures.len(), 1);
        assert!(report.fault().unwrap().contains("revert incomplete"));
    }

    #[tokio::test]
    async fn invalid_action_stops_before_any_call() {
        let client = Arc::new(RecordingClient::new());
        let applier = DefaultApplier::new(client.clone());
        let mut solution = plan();
        let mut bad = Parameters::new();
        bad.insert("state".into(), "sideways".into());
        solution.add_action("change_node_power_state", "a", bad);

        let err = applier.apply(&solution).await.unwrap_err();
        assert!(matches!(err, EngineError::SchemaValidation { .. }));
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_action_type_is_rejected() {
        let applier = PlanOnlyApplier::default();
        let mut solution = Solution::new("test");
        solution.add_action("sleep", "", Parameters::new());
        assert!(matches!(
            applier.apply(&solution).await,
            Err(EngineError::ActionTypeNotFound(_))
        ));
    }
}
