//! Cluster elements: compute nodes and the instances they host.
//!
//! Status fields are plain enums; the string forms only exist at the serde
//! boundary (model files, action parameters, notifications).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Liveness of a compute node. Observed, never changed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Online,
    Offline,
}

/// Service admission status of a compute node, changed through actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Enabled,
    Disabled,
    Maintaining,
    #[serde(rename = "poweron")]
    PowerOn,
    #[serde(rename = "poweroff")]
    PowerOff,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 5] = [
        ServiceStatus::Enabled,
        ServiceStatus::Disabled,
        ServiceStatus::Maintaining,
        ServiceStatus::PowerOn,
        ServiceStatus::PowerOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Enabled => "enabled",
            ServiceStatus::Disabled => "disabled",
            ServiceStatus::Maintaining => "maintaining",
            ServiceStatus::PowerOn => "poweron",
            ServiceStatus::PowerOff => "poweroff",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseStateError {
    kind: &'static str,
    value: String,
}

impl FromStr for ServiceStatus {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStateError {
                kind: "service status",
                value: s.to_string(),
            })
    }
}

/// Lifecycle state of a workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Active,
    Stopped,
    Paused,
    Suspended,
    Error,
}

/// vCPU, memory and disk quantities. Used both for capacity and for demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub vcpus: u64,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub disk_gb: u64,
}

impl Resources {
    pub fn new(vcpus: u64, memory_mb: u64, disk_gb: u64) -> Self {
        Self {
            vcpus,
            memory_mb,
            disk_gb,
        }
    }

    /// Whether `self` fits into `free`. Placement only considers CPU and memory.
    pub fn fits_within(&self, free: &Resources) -> bool {
        self.vcpus <= free.vcpus && self.memory_mb <= free.memory_mb
    }

    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            vcpus: self.vcpus.saturating_sub(other.vcpus),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            disk_gb: self.disk_gb.saturating_sub(other.disk_gb),
        }
    }
}

impl std::ops::Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            vcpus: self.vcpus + rhs.vcpus,
            memory_mb: self.memory_mb + rhs.memory_mb,
            disk_gb: self.disk_gb + rhs.disk_gb,
        }
    }
}

impl std::iter::Sum for Resources {
    fn sum<I: Iterator<Item = Resources>>(iter: I) -> Resources {
        iter.fold(Resources::default(), |acc, r| acc + r)
    }
}

/// A hypervisor host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,
    pub hostname: String,
    pub capacity: Resources,
    pub state: NodeState,
    pub status: ServiceStatus,
}

impl Node {
    pub fn new(
        uuid: impl Into<String>,
        hostname: impl Into<String>,
        capacity: Resources,
        state: NodeState,
        status: ServiceStatus,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            hostname: hostname.into(),
            capacity,
            state,
            status,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == NodeState::Online
    }
}

/// A workload instance. Placement lives in the cluster model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub demand: Resources,
    pub state: InstanceState,
}

impl Instance {
    pub fn new(uuid: impl Into<String>, demand: Resources, state: InstanceState) -> Self {
        let uuid = uuid.into();
        Self {
            name: uuid.clone(),
            uuid,
            demand,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_round_trips_through_strings() {
        for status in ServiceStatus::ALL {
            assert_eq!(status.as_str().parse::<ServiceStatus>(), Ok(status));
        }
        assert!("MAINTAINING".parse::<ServiceStatus>().is_err());
        assert_eq!(
            serde_json::to_value(ServiceStatus::PowerOff).unwrap(),
            serde_json::json!("poweroff")
        );
    }

    #[test]
    fn fit_ignores_disk() {
        let demand = Resources::new(2, 4096, 500);
        assert!(demand.fits_within(&Resources::new(2, 4096, 0)));
        assert!(!demand.fits_within(&Resources::new(1, 8192, 1000)));
        assert!(!demand.fits_within(&Resources::new(4, 2048, 1000)));
    }
}
