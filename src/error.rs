//! Engine error taxonomy.
//!
//! Every failure the engine can report maps to one [`ErrorKind`]; handlers use
//! the kind to decide how loudly to log and what to record on the audit.

use thiserror::Error;
use uuid::Uuid;

use crate::actions::schema::SchemaError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameters for {context}: {source}")]
    SchemaValidation {
        context: String,
        #[source]
        source: SchemaError,
    },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("the cluster model is not defined")]
    ClusterStateNotDefined,

    #[error("the cluster model is stale")]
    ClusterStateStale,

    #[error("strategy {strategy} found no solution: {reason}")]
    SolutionNotFound { strategy: String, reason: String },

    #[error("action {action_type} on {resource_id} failed: {message}")]
    ActionExecution {
        action_type: String,
        resource_id: String,
        message: String,
    },

    #[error("revert of action {action_type} on {resource_id} failed: {message}")]
    ActionRevert {
        action_type: String,
        resource_id: String,
        message: String,
    },

    #[error("cluster model collector '{0}' not found")]
    CollectorNotFound(String),

    #[error("strategy '{0}' not found")]
    StrategyNotFound(String),

    #[error("action type '{0}' not found")]
    ActionTypeNotFound(String),

    #[error("audit {0} not found")]
    AuditNotFound(Uuid),

    #[error("compute node '{0}' not found")]
    NodeNotFound(String),

    #[error("instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("invalid audit {uuid}: {reason}")]
    InvalidAudit { uuid: Uuid, reason: String },

    #[error("audit store error: {0}")]
    Store(String),
}

/// Coarse classification of [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad action, strategy or audit parameters. Raised before any external effect.
    Validation,
    /// The cluster model cannot be planned on.
    Precondition,
    /// The strategy exhausted every mode without a feasible plan.
    NoSolution,
    /// An infrastructure call failed while executing or reverting a plan.
    Execution,
    /// Collaborator lookups and persistence.
    Scheduler,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::SchemaValidation { .. }
            | EngineError::IllegalArgument(_)
            | EngineError::InvalidAudit { .. }
            | EngineError::NodeNotFound(_)
            | EngineError::InstanceNotFound(_)
            | EngineError::StrategyNotFound(_)
            | EngineError::ActionTypeNotFound(_) => ErrorKind::Validation,
            EngineError::ClusterStateNotDefined | EngineError::ClusterStateStale => {
                ErrorKind::Precondition
            }
            EngineError::SolutionNotFound { .. } => ErrorKind::NoSolution,
            EngineError::ActionExecution { .. } | EngineError::ActionRevert { .. } => {
                ErrorKind::Execution
            }
            EngineError::CollectorNotFound(_)
            | EngineError::AuditNotFound(_)
            | EngineError::Store(_) => ErrorKind::Scheduler,
        }
    }

    pub fn schema(context: impl Into<String>, source: SchemaError) -> Self {
        EngineError::SchemaValidation {
            context: context.into(),
            source,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
