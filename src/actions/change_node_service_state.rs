//! Change the service status of a compute node.
//!
//! A disabled node is skipped by the compute scheduler for new placements; a
//! maintaining node is additionally skipped by the optimizer as a migration
//! destination. Power transitions are recorded as a status before the power
//! action runs, so both `poweron` and `poweroff` targets keep the service
//! disabled.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::infra::InfraClient;
use crate::model::ServiceStatus;

use super::schema::{ObjectSchema, Property};
use super::{execution_error, revert_error, Action, ActionInput, Parameters};

pub const ACTION_TYPE: &str = "change_node_service_state";

const CURRENT: &str = "current";
const TARGET: &str = "target";

pub struct ChangeNodeServiceState {
    input: ActionInput,
}

impl ChangeNodeServiceState {
    pub fn new(input: ActionInput) -> Self {
        Self { input }
    }

    pub fn parameters(current: ServiceStatus, target: ServiceStatus) -> Parameters {
        let mut params = Parameters::new();
        params.insert(CURRENT.into(), Value::String(current.as_str().into()));
        params.insert(TARGET.into(), Value::String(target.as_str().into()));
        params
    }

    pub fn current_state(&self) -> Option<ServiceStatus> {
        self.input.str_param(CURRENT)?.parse().ok()
    }

    pub fn target_state(&self) -> Option<ServiceStatus> {
        self.input.str_param(TARGET)?.parse().ok()
    }

    /// The same action with `current` and `target` swapped.
    pub fn inverse(&self) -> Self {
        let mut parameters = self.input.parameters.clone();
        let current = parameters.remove(CURRENT);
        let target = parameters.remove(TARGET);
        if let Some(target) = target {
            parameters.insert(CURRENT.into(), target);
        }
        if let Some(current) = current {
            parameters.insert(TARGET.into(), current);
        }
        Self::new(ActionInput::new(self.input.resource_id.clone(), parameters))
    }

    async fn manage_service(&self, client: &dyn InfraClient) -> EngineResult<()> {
        let state = self.target_state().ok_or_else(|| {
            EngineError::IllegalArgument("the target state is not defined".to_string())
        })?;
        let node = self.resource_id();
        debug!(node, target = %state, "changing node service state");
        let result = match state {
            ServiceStatus::Enabled => client.enable(node).await,
            ServiceStatus::Disabled => client.disable(node, "steward_disabled").await,
            ServiceStatus::Maintaining => client.disable(node, "steward_maintaining").await,
            ServiceStatus::PowerOff => client.disable(node, "steward_poweroff").await,
            ServiceStatus::PowerOn => client.disable(node, "steward_poweron").await,
        };
        result.map_err(|e| execution_error(self, e))
    }
}

pub fn schema() -> ObjectSchema {
    let statuses = || ServiceStatus::ALL.into_iter().map(|s| s.as_str());
    ObjectSchema::new()
        .required_property(Property::string("resource_id", "compute node uuid").min_length(1))
        .required_property(Property::one_of(CURRENT, "current service status", statuses()))
        .required_property(Property::one_of(TARGET, "requested service status", statuses()))
}

#[async_trait]
impl Action for ChangeNodeServiceState {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn input(&self) -> &ActionInput {
        &self.input
    }

    fn schema(&self) -> ObjectSchema {
        schema()
    }

    fn description(&self) -> String {
        "Change the service status of a compute node. A disabled node is not \
         selected for new instances; a maintaining node is not selected as a \
         migration destination."
            .to_string()
    }

    async fn execute(&self, client: &dyn InfraClient) -> EngineResult<()> {
        self.manage_service(client).await
    }

    async fn revert(&self, client: &dyn InfraClient) -> EngineResult<()> {
        self.inverse()
            .manage_service(client)
            .await
            .map_err(|e| revert_error(self, e))
    }
}
