//! Logs a message and changes nothing. Planned by the `dummy` strategy.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::EngineResult;
use crate::infra::InfraClient;

use super::schema::{ObjectSchema, Property};
use super::{Action, ActionInput, Parameters};

pub const ACTION_TYPE: &str = "nop";

pub struct Nop {
    input: ActionInput,
}

impl Nop {
    pub fn new(input: ActionInput) -> Self {
        Self { input }
    }

    pub fn parameters(message: &str) -> Parameters {
        let mut params = Parameters::new();
        params.insert("message".into(), Value::String(message.into()));
        params
    }

    fn message(&self) -> &str {
        self.input.str_param("message").unwrap_or_default()
    }
}

pub fn schema() -> ObjectSchema {
    ObjectSchema::new()
        .property(Property::string("resource_id", "unused"))
        .required_property(Property::string("message", "text to log"))
}

#[async_trait]
impl Action for Nop {
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
        "Logs a message".to_string()
    }

    async fn execute(&self, _client: &dyn InfraClient) -> EngineResult<()> {
        info!(message = self.message(), "nop executed");
        Ok(())
    }

    async fn revert(&self, _client: &dyn InfraClient) -> EngineResult<()> {
        info!(message = self.message(), "nop reverted");
        Ok(())
    }
}
