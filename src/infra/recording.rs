//! In-memory infrastructure client.
//!
//! Records every call instead of reaching a real endpoint. The daemon uses it
//! as its dry-run backend; tests use it to assert on call order and to inject
//! failures.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::{InfraClient, InfraError, MigrationType, PowerState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfraCall {
    Enable {
        node: String,
    },
    Disable {
        node: String,
        reason: String,
    },
    Power {
        node: String,
        state: PowerState,
    },
    Migrate {
        instance: String,
        source: String,
        destination: String,
        migration_type: MigrationType,
    },
}

impl InfraCall {
    fn resource(&self) -> &str {
        match self {
            InfraCall::Enable { node }
            | InfraCall::Disable { node, .. }
            | InfraCall::Power { node, .. } => node,
            InfraCall::Migrate { instance, .. } => instance,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            InfraCall::Enable { .. } => "enable",
            InfraCall::Disable { .. } => "disable",
            InfraCall::Power { .. } => "power",
            InfraCall::Migrate { .. } => "migrate",
        }
    }
}

type FailurePredicate = Box<dyn Fn(&InfraCall) -> bool + Send + Sync>;

#[derive(Default)]
pub struct RecordingClient {
    calls: Arc<RwLock<Vec<InfraCall>>>,
    fail_when: RwLock<Option<FailurePredicate>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every call matching `predicate` (the call is still recorded).
    pub async fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&InfraCall) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.write().await = Some(Box::new(predicate));
    }

    pub async fn calls(&self) -> Vec<InfraCall> {
        self.calls.read().await.clone()
    }

    async fn record(&self, call: InfraCall) -> Result<(), InfraError> {
        info!(
            operation = call.operation(),
            resource = call.resource(),
            "infra call (recorded)"
        );
        let rejected = self
            .fail_when
            .read()
            .await
            .as_ref()
            .is_some_and(|predicate| predicate(&call));
        let result = if rejected {
            Err(InfraError::Rejected {
                operation: call.operation(),
                resource: call.resource().to_string(),
                reason: "injected failure".to_string(),
            })
        } else {
            Ok(())
        };
        self.calls.write().await.push(call);
        result
    }
}

#[async_trait]
impl InfraClient for RecordingClient {
    async fn enable(&self, node: &str) -> Result<(), InfraError> {
        self.record(InfraCall::Enable {
            node: node.to_string(),
        })
        .await
    }

    async fn disable(&self, node: &str, reason: &str) -> Result<(), InfraError> {
        self.record(InfraCall::Disable {
            node: node.to_string(),
            reason: reason.to_string(),
        })
        .await
    }

    async fn power(&self, node: &str, state: PowerState) -> Result<(), InfraError> {
        self.record(InfraCall::Power {
            node: node.to_string(),
            state,
        })
        .await
    }

    async fn migrate(
        &self,
        instance: &str,
        source: &str,
        destination: &str,
        migration_type: MigrationType,
    ) -> Result<(), InfraError> {
        self.record(InfraCall::Migrate {
            instance: instance.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            migration_type,
        })
        .await
    }
}
