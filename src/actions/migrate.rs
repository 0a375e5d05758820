//! Move an instance between compute nodes.
//!
//! Active instances are live-migrated, everything else is cold-migrated. The
//! migration type is chosen at planning time and carried as a parameter.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::infra::{InfraClient, MigrationType};

use super::schema::{ObjectSchema, Property};
use super::{execution_error, revert_error, Action, ActionInput, Parameters};

pub const ACTION_TYPE: &str = "migrate";

const MIGRATION_TYPE: &str = "migration_type";
const SOURCE_NODE: &str = "source_node";
const DESTINATION_NODE: &str = "destination_node";

pub struct Migrate {
    input: ActionInput,
}

impl Migrate {
    pub fn new(input: ActionInput) -> Self {
        Self { input }
    }

    pub fn parameters(migration_type: MigrationType, source: &str, destination: &str) -> Parameters {
        let mut params = Parameters::new();
        params.insert(
            MIGRATION_TYPE.into(),
            Value::String(migration_type.as_str().into()),
        );
        params.insert(SOURCE_NODE.into(), Value::String(source.into()));
        params.insert(DESTINATION_NODE.into(), Value::String(destination.into()));
        params
    }

    pub fn migration_type(&self) -> Option<MigrationType> {
        match self.input.str_param(MIGRATION_TYPE)? {
            "live" => Some(MigrationType::Live),
            "cold" => Some(MigrationType::Cold),
            _ => None,
        }
    }

    pub fn source_node(&self) -> Option<&str> {
        self.input.str_param(SOURCE_NODE)
    }

    pub fn destination_node(&self) -> Option<&str> {
        self.input.str_param(DESTINATION_NODE)
    }

    fn route(&self) -> EngineResult<(MigrationType, &str, &str)> {
        let missing = |what: &str| EngineError::IllegalArgument(format!("the {what} is not defined"));
        Ok((
            self.migration_type().ok_or_else(|| missing("migration type"))?,
            self.source_node().ok_or_else(|| missing("source node"))?,
            self.destination_node()
                .ok_or_else(|| missing("destination node"))?,
        ))
    }

    async fn migrate(
        &self,
        client: &dyn InfraClient,
        kind: MigrationType,
        from: &str,
        to: &str,
    ) -> EngineResult<()> {
        client
            .migrate(self.resource_id(), from, to, kind)
            .await
            .map_err(|e| execution_error(self, e))
    }
}

pub fn schema() -> ObjectSchema {
    ObjectSchema::new()
        .required_property(Property::string("resource_id", "instance uuid").min_length(1))
        .required_property(Property::one_of(
            MIGRATION_TYPE,
            "live for active instances, cold otherwise",
            ["live", "cold"],
        ))
        .required_property(Property::string(SOURCE_NODE, "current host").min_length(1))
        .required_property(Property::string(DESTINATION_NODE, "new host").min_length(1))
}

#[async_trait]
impl Action for Migrate {
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
        "Move an instance to another compute node: live migration for active \
         instances, cold migration otherwise."
            .to_string()
    }

    async fn pre_condition(&self) -> EngineResult<()> {
        let (_, source, destination) = self.route()?;
        if source == destination {
            return Err(EngineError::IllegalArgument(format!(
                "instance {} already runs on {source}",
                self.resource_id()
            )));
        }
        Ok(())
    }

    async fn execute(&self, client: &dyn InfraClient) -> EngineResult<()> {
        let (kind, source, destination) = self.route()?;
        self.migrate(client, kind, source, destination).await
    }

    async fn revert(&self, client: &dyn InfraClient) -> EngineResult<()> {
        let (kind, source, destination) = self.route()?;
        self.migrate(client, kind, destination, source)
            .await
            .map_err(|e| revert_error(self, e))
    }
}
