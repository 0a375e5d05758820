//! Cluster model collectors.
//!
//! Collection is owned by an external system; the engine only asks a named
//! collector for a fresh snapshot at the start of every audit execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

use super::cluster::{ClusterModel, Scope};
use super::element::{Instance, Node, NodeState, Resources, ServiceStatus};

pub const COMPUTE_COLLECTOR: &str = "compute";

#[async_trait]
pub trait ClusterModelCollector: Send + Sync {
    /// Return a snapshot owned by the caller, restricted to `scope`.
    async fn collect(&self, scope: &Scope) -> EngineResult<ClusterModel>;
}

/// Named collector registry.
#[derive(Default)]
pub struct CollectorManager {
    collectors: BTreeMap<String, Arc<dyn ClusterModelCollector>>,
}

impl CollectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collector(
        mut self,
        name: impl Into<String>,
        collector: Arc<dyn ClusterModelCollector>,
    ) -> Self {
        self.collectors.insert(name.into(), collector);
        self
    }

    pub fn get_cluster_model_collector(
        &self,
        name: &str,
    ) -> EngineResult<Arc<dyn ClusterModelCollector>> {
        self.collectors
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::CollectorNotFound(name.to_string()))
    }
}

/// Hands out clones of a prepared model.
pub struct StaticCollector {
    model: ClusterModel,
}

impl StaticCollector {
    pub fn new(model: ClusterModel) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ClusterModelCollector for StaticCollector {
    async fn collect(&self, scope: &Scope) -> EngineResult<ClusterModel> {
        Ok(self.model.clone().restrict(scope))
    }
}

/// Re-reads a YAML cluster description on every collection.
pub struct FileCollector {
    path: PathBuf,
}

impl FileCollector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ClusterModelCollector for FileCollector {
    async fn collect(&self, scope: &Scope) -> EngineResult<ClusterModel> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EngineError::Store(format!("reading {}: {e}", self.path.display())))?;
        let file = ModelFile::from_yaml(&content)?;
        let model = file.into_model()?;
        debug!(
            path = %self.path.display(),
            nodes = model.node_count(),
            instances = model.instance_count(),
            "collected cluster model"
        );
        Ok(model.restrict(scope))
    }
}

/// On-disk cluster description: nodes with their hosted instances inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub uuid: String,
    #[serde(default)]
    pub hostname: Option<String>,
    pub capacity: Resources,
    pub state: NodeState,
    pub status: ServiceStatus,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl ModelFile {
    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| EngineError::Store(format!("parsing cluster model: {e}")))
    }

    pub fn into_model(self) -> EngineResult<ClusterModel> {
        let mut model = ClusterModel::new();
        for entry in self.nodes {
            let hostname = entry.hostname.unwrap_or_else(|| entry.uuid.clone());
            model.add_node(Node::new(
                entry.uuid.clone(),
                hostname,
                entry.capacity,
                entry.state,
                entry.status,
            ));
            for instance in entry.instances {
                model.add_instance(instance, &entry.uuid)?;
            }
        }
        if self.stale {
            model.mark_stale();
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
nodes:
  - uuid: n1
    hostname: compute-1
    capacity: { vcpus: 16, memory_mb: 32768, disk_gb: 500 }
    state: online
    status: enabled
    instances:
      - uuid: vm-1
        demand: { vcpus: 2, memory_mb: 2048, disk_gb: 20 }
        state: active
  - uuid: n2
    capacity: { vcpus: 8, memory_mb: 16384 }
    state: offline
    status: poweroff
"#;

    #[test]
    fn parses_model_file() {
        let model = ModelFile::from_yaml(YAML).unwrap().into_model().unwrap();
        assert_eq!(model.node_count(), 2);
        assert_eq!(model.node("n2").unwrap().hostname, "n2");
        assert_eq!(model.instance_host("vm-1").unwrap().hostname, "compute-1");
        assert!(!model.is_stale());
    }

    #[test]
    fn rejects_unknown_status_at_ingestion() {
        let bad = YAML.replace("status: poweroff", "status: sleeping");
        assert!(ModelFile::from_yaml(&bad).is_err());
    }

    #[tokio::test]
    async fn file_collector_reads_fresh_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        std::fs::write(&path, YAML).unwrap();
        let collector = FileCollector::new(path);
        let model = collector.collect(&Scope::default()).await.unwrap();
        assert_eq!(model.instance_count(), 1);
    }

    #[tokio::test]
    async fn unknown_collector_is_reported() {
        let manager = CollectorManager::new();
        assert!(matches!(
            manager.get_cluster_model_collector("storage"),
            Err(EngineError::CollectorNotFound(name)) if name == "storage"
        ));
    }
}
