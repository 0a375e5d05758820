//! Power a compute node on or off.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::infra::{InfraClient, PowerState};

use super::schema::{ObjectSchema, Property};
use super::{execution_error, revert_error, Action, ActionInput, Parameters};

pub const ACTION_TYPE: &str = "change_node_power_state";

const STATE: &str = "state";

pub struct ChangeNodePowerState {
    input: ActionInput,
}

impl ChangeNodePowerState {
    pub fn new(input: ActionInput) -> Self {
        Self { input }
    }

    pub fn parameters(state: PowerState) -> Parameters {
        let mut params = Parameters::new();
        params.insert(STATE.into(), Value::String(state.as_str().into()));
        params
    }

    pub fn power_state(&self) -> Option<PowerState> {
        match self.input.str_param(STATE)? {
            "on" => Some(PowerState::On),
            "off" => Some(PowerState::Off),
            _ => None,
        }
    }

    async fn set_power(&self, client: &dyn InfraClient, state: PowerState) -> EngineResult<()> {
        client
            .power(self.resource_id(), state)
            .await
            .map_err(|e| execution_error(self, e))
    }

    fn requested(&self) -> EngineResult<PowerState> {
        self.power_state().ok_or_else(|| {
            EngineError::IllegalArgument("the power state is not defined".to_string())
        })
    }
}

pub fn schema() -> ObjectSchema {
    ObjectSchema::new()
        .required_property(Property::string("resource_id", "compute node uuid").min_length(1))
        .required_property(Property::one_of(STATE, "requested power state", ["on", "off"]))
}

#[async_trait]
impl Action for ChangeNodePowerState {
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
        "Change the power state of a compute node through its management interface.".to_string()
    }

    async fn execute(&self, client: &dyn InfraClient) -> EngineResult<()> {
        let state = self.requested()?;
        self.set_power(client, state).await
    }

    async fn revert(&self, client: &dyn InfraClient) -> EngineResult<()> {
        let state = self.requested()?;
        self.set_power(client, state.inverse())
            .await
            .map_err(|e| revert_error(self, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{InfraCall, RecordingClient};

    fn action(state: PowerState) -> ChangeNodePowerState {
        ChangeNodePowerState::new(ActionInput::new("n7", ChangeNodePowerState::parameters(state)))
    }

    #[tokio::test]
    async fn revert_flips_the_power_state() {
        let client = RecordingClient::new();
        let off = action(PowerState::Off);
        assert!(off.validate_parameters().is_ok());
        off.execute(&client).await.unwrap();
        off.revert(&client).await.unwrap();
        assert_eq!(
            client.calls().await,
            vec![
                InfraCall::Power {
                    node: "n7".into(),
                    state: PowerState::Off
                },
                InfraCall::Power {
                    node: "n7".into(),
                    state: PowerState::On
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_state_fails_before_any_call() {
        let client = RecordingClient::new();
        let mut params = Parameters::new();
        params.insert(STATE.into(), Value::String("hibernate".into()));
        let action = ChangeNodePowerState::new(ActionInput::new("n7", params));
        assert!(action.validate_parameters().is_err());
        assert!(matches!(
            action.execute(&client).await,
            Err(EngineError::IllegalArgument(_))
        ));
        assert!(client.calls().await.is_empty());
    }
}
