//! Audits: requests to run a strategy once or on a schedule.
//!
//! ```text
//! PENDING ──▶ ONGOING ──▶ SUCCEEDED ─┐
//!    │           │    └─▶ FAILED ────┤ (continuous audits go back to ONGOING)
//!    └───────────┴──────▶ CANCELLED ◀┘
//! ```
//!
//! A continuous audit left ONGOING by an interrupted run may be dispatched
//! again from ONGOING; the scheduler never runs one audit twice at once.
//!
//! CANCELLED is terminal. It is written to the store from outside the engine
//! and is never overwritten by a run that was already in flight.

pub mod applier;
pub mod continuous;
pub mod handler;
pub mod oneshot;
pub mod store;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::Parameters;
use crate::error::{EngineError, EngineResult};
use crate::model::Scope;

pub use applier::{Applier, ApplyReport, DefaultApplier};
pub use continuous::ContinuousAuditHandler;
pub use handler::{AuditEngine, AuditOutcome};
pub use oneshot::OneShotAuditHandler;
pub use store::{AuditStore, FileAuditStore, InMemoryAuditStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditType {
    Oneshot,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditState {
    Pending,
    Ongoing,
    Succeeded,
    Failed,
    Cancelled,
}

impl AuditState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditState::Pending => "PENDING",
            AuditState::Ongoing => "ONGOING",
            AuditState::Succeeded => "SUCCEEDED",
            AuditState::Failed => "FAILED",
            AuditState::Cancelled => "CANCELLED",
        }
    }

    /// Whether `self → to` is a legal move for an audit of `audit_type`.
    pub fn can_transition(self, to: AuditState, audit_type: AuditType) -> bool {
        use AuditState::*;
        match (self, to) {
            (Cancelled, _) => false,
            (_, Cancelled) => true,
            (Pending, Ongoing) => true,
            (Ongoing, Succeeded | Failed) => true,
            (Ongoing | Succeeded | Failed, Ongoing) => audit_type == AuditType::Continuous,
            _ => false,
        }
    }
}

impl fmt::Display for AuditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditType::Oneshot => "ONESHOT",
            AuditType::Continuous => "CONTINUOUS",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub uuid: Uuid,
    pub name: String,
    pub audit_type: AuditType,
    pub state: AuditState,
    pub goal: String,
    /// Explicit strategy. When absent, the first strategy serving `goal` runs.
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    /// Seconds between runs. Continuous audits only.
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub scope: Scope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Audit {
    pub fn new(name: impl Into<String>, audit_type: AuditType, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            audit_type,
            state: AuditState::Pending,
            goal: goal.into(),
            strategy: None,
            parameters: Parameters::new(),
            interval: None,
            scope: Scope::default(),
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval = Some(secs);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn is_continuous(&self) -> bool {
        self.audit_type == AuditType::Continuous
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == AuditState::Cancelled
    }

    /// Structural checks run before an audit is stored or dispatched.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |reason: &str| EngineError::InvalidAudit {
            uuid: self.uuid,
            reason: reason.to_string(),
        };
        if self.goal.trim().is_empty() {
            return Err(invalid("a goal is required"));
        }
        match (self.audit_type, self.interval) {
            (AuditType::Oneshot, Some(_)) => Err(invalid("interval is only allowed on continuous audits")),
            (AuditType::Continuous, Some(0)) => Err(invalid("interval must be positive")),
            _ => Ok(()),
        }
    }

    /// Scheduling period, falling back to `default` when the audit has none.
    pub fn period(&self, default: Duration) -> Duration {
        self.interval.map(Duration::from_secs).unwrap_or(default)
    }

    /// Move to `to`, returning the previous state.
    pub fn transition(&mut self, to: AuditState) -> EngineResult<AuditState> {
        if !self.state.can_transition(to, self.audit_type) {
            return Err(EngineError::InvalidAudit {
                uuid: self.uuid,
                reason: format!("illegal state change {} → {to}", self.state),
            });
        }
        let old = self.state;
        self.state = to;
        self.updated_at = Utc::now();
        Ok(old)
    }
}
