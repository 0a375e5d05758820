//! Infrastructure client boundary.
//!
//! Actions call these abstract operations; concrete compute/power clients live
//! outside this crate and translate them into real API calls.

pub mod recording;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use recording::{InfraCall, RecordingClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn inverse(self) -> Self {
        match self {
            PowerState::On => PowerState::Off,
            PowerState::Off => PowerState::On,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationType {
    Live,
    Cold,
}

impl MigrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationType::Live => "live",
            MigrationType::Cold => "cold",
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InfraError {
    #[error("{operation} on {resource} was rejected: {reason}")]
    Rejected {
        operation: &'static str,
        resource: String,
        reason: String,
    },
}

#[async_trait]
pub trait InfraClient: Send + Sync {
    async fn enable(&self, node: &str) -> Result<(), InfraError>;

    async fn disable(&self, node: &str, reason: &str) -> Result<(), InfraError>;

    async fn power(&self, node: &str, state: PowerState) -> Result<(), InfraError>;

    async fn migrate(
        &self,
        instance: &str,
        source: &str,
        destination: &str,
        migration_type: MigrationType,
    ) -> Result<(), InfraError>;
}
