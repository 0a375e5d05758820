//! Actions: single planned infrastructure changes.
//!
//! Strategies only describe actions as [`PlannedAction`](crate::solution::PlannedAction)
//! records. The applier turns each record into a typed [`Action`] through the
//! [`ActionRegistry`], validates it, then executes it against an
//! [`InfraClient`](crate::infra::InfraClient).

pub mod change_node_power_state;
pub mod change_node_service_state;
pub mod migrate;
pub mod nop;
pub mod schema;

use std::collections::BTreeMap;
use std::fmt::Display;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::infra::InfraClient;
use crate::solution::PlannedAction;

pub use change_node_power_state::ChangeNodePowerState;
pub use change_node_service_state::ChangeNodeServiceState;
pub use migrate::Migrate;
pub use nop::Nop;
pub use schema::ObjectSchema;

pub type Parameters = Map<String, Value>;

/// The raw input of an action: target resource plus typed-by-schema parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInput {
    pub resource_id: String,
    pub parameters: Parameters,
}

impl ActionInput {
    pub fn new(resource_id: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            resource_id: resource_id.into(),
            parameters,
        }
    }

    /// The document validated against the action schema.
    pub fn document(&self) -> Value {
        let mut doc = self.parameters.clone();
        doc.insert(
            "resource_id".to_string(),
            Value::String(self.resource_id.clone()),
        );
        Value::Object(doc)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    fn action_type(&self) -> &'static str;

    fn input(&self) -> &ActionInput;

    fn schema(&self) -> ObjectSchema;

    fn description(&self) -> String;

    fn resource_id(&self) -> &str {
        &self.input().resource_id
    }

    fn validate_parameters(&self) -> EngineResult<()> {
        self.schema()
            .validate(&self.input().document())
            .map_err(|e| EngineError::schema(self.action_type(), e))
    }

    async fn pre_condition(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn execute(&self, client: &dyn InfraClient) -> EngineResult<()>;

    async fn revert(&self, client: &dyn InfraClient) -> EngineResult<()>;

    async fn post_condition(&self) -> EngineResult<()> {
        Ok(())
    }
}

pub(crate) fn execution_error(action: &dyn Action, message: impl Display) -> EngineError {
    EngineError::ActionExecution {
        action_type: action.action_type().to_string(),
        resource_id: action.resource_id().to_string(),
        message: message.to_string(),
    }
}

/// Wrap a failure from the forward path as a revert failure.
pub(crate) fn revert_error(action: &dyn Action, err: EngineError) -> EngineError {
    let message = match err {
        EngineError::ActionExecution { message, .. } => message,
        other => other.to_string(),
    };
    EngineError::ActionRevert {
        action_type: action.action_type().to_string(),
        resource_id: action.resource_id().to_string(),
        message,
    }
}

type ActionConstructor = fn(ActionInput) -> Box<dyn Action>;

/// Maps action type names to constructors.
pub struct ActionRegistry {
    constructors: BTreeMap<&'static str, ActionConstructor>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
            .register(change_node_service_state::ACTION_TYPE, |input| {
                Box::new(ChangeNodeServiceState::new(input))
            })
            .register(change_node_power_state::ACTION_TYPE, |input| {
                Box::new(ChangeNodePowerState::new(input))
            })
            .register(migrate::ACTION_TYPE, |input| Box::new(Migrate::new(input)))
            .register(nop::ACTION_TYPE, |input| Box::new(Nop::new(input)))
    }
}

impl ActionRegistry {
    /// An empty registry. Use `default()` for the built-in action types.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(mut self, action_type: &'static str, constructor: ActionConstructor) -> Self {
        self.constructors.insert(action_type, constructor);
        self
    }

    pub fn action_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    pub fn build(&self, planned: &PlannedAction) -> EngineResult<Box<dyn Action>> {
        let constructor = self
            .constructors
            .get(planned.action_type.as_str())
            .ok_or_else(|| EngineError::ActionTypeNotFound(planned.action_type.clone()))?;
        Ok(constructor(ActionInput::new(
            planned.resource_id.clone(),
            planned.input_parameters.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn planned(action_type: &str, params: Value) -> PlannedAction {
        PlannedAction {
            action_type: action_type.to_string(),
            resource_id: "n1".to_string(),
            input_parameters: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn builds_registered_action_types() {
        let registry = ActionRegistry::default();
        let action = registry
            .build(&planned(
                "change_node_service_state",
                json!({"current": "enabled", "target": "disabled"}),
            ))
            .unwrap();
        assert_eq!(action.action_type(), "change_node_service_state");
        assert_eq!(action.resource_id(), "n1");
        assert!(action.validate_parameters().is_ok());
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let registry = ActionRegistry::default();
        assert!(matches!(
            registry.build(&planned("reboot", json!({}))),
            Err(EngineError::ActionTypeNotFound(t)) if t == "reboot"
        ));
    }

    #[test]
    fn registry_lists_builtin_types() {
        let types: Vec<_> = ActionRegistry::default().action_types().collect();
        assert_eq!(
            types,
            vec![
                "change_node_power_state",
                "change_node_service_state",
                "migrate",
                "nop"
            ]
        );
    }
}
