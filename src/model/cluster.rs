//! The cluster model, an owned snapshot of nodes, instances and placement.
//!
//! Every audit execution receives its own `ClusterModel` from a collector.
//! Strategies read it and record planned moves through
//! [`ClusterModel::migrate_instance`], which only touches this snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

use super::element::{Instance, Node, Resources};

/// Restricts a model to a subset of nodes. Entries match uuid or hostname.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Scope {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    fn admits(&self, node: &Node) -> bool {
        let matches = |entry: &String| *entry == node.uuid || *entry == node.hostname;
        let included = self.include.is_empty() || self.include.iter().any(matches);
        included && !self.exclude.iter().any(matches)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    nodes: BTreeMap<String, Node>,
    instances: BTreeMap<String, Instance>,
    /// instance uuid → hosting node uuid
    placement: BTreeMap<String, String>,
    /// node uuid → hosted instance uuids, derived from `placement`
    hosted: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    stale: bool,
}

impl ClusterModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.hosted.entry(node.uuid.clone()).or_default();
        self.nodes.insert(node.uuid.clone(), node);
    }

    pub fn add_instance(&mut self, instance: Instance, node_uuid: &str) -> EngineResult<()> {
        if !self.nodes.contains_key(node_uuid) {
            return Err(EngineError::NodeNotFound(node_uuid.to_string()));
        }
        let uuid = instance.uuid.clone();
        if let Some(previous) = self.placement.insert(uuid.clone(), node_uuid.to_string()) {
            if let Some(set) = self.hosted.get_mut(&previous) {
                set.remove(&uuid);
            }
        }
        self.hosted
            .entry(node_uuid.to_string())
            .or_default()
            .insert(uuid.clone());
        self.instances.insert(uuid, instance);
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn node(&self, uuid: &str) -> EngineResult<&Node> {
        self.nodes
            .get(uuid)
            .ok_or_else(|| EngineError::NodeNotFound(uuid.to_string()))
    }

    /// Look a node up by uuid first, then by hostname.
    pub fn find_node(&self, id: &str) -> EngineResult<&Node> {
        self.nodes
            .get(id)
            .or_else(|| self.nodes.values().find(|n| n.hostname == id))
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))
    }

    pub fn instance(&self, uuid: &str) -> EngineResult<&Instance> {
        self.instances
            .get(uuid)
            .ok_or_else(|| EngineError::InstanceNotFound(uuid.to_string()))
    }

    pub fn instance_host(&self, instance_uuid: &str) -> Option<&Node> {
        self.placement
            .get(instance_uuid)
            .and_then(|node| self.nodes.get(node))
    }

    pub fn node_instances(&self, node_uuid: &str) -> Vec<&Instance> {
        self.hosted
            .get(node_uuid)
            .into_iter()
            .flatten()
            .filter_map(|uuid| self.instances.get(uuid))
            .collect()
    }

    pub fn node_used(&self, node_uuid: &str) -> Resources {
        self.node_instances(node_uuid)
            .into_iter()
            .map(|i| i.demand)
            .sum()
    }

    pub fn node_free(&self, node: &Node) -> Resources {
        node.capacity.saturating_sub(&self.node_used(&node.uuid))
    }

    /// Record that `instance` moves from `source` to `destination`.
    ///
    /// Returns `Ok(false)` when source and destination are the same node.
    pub fn migrate_instance(
        &mut self,
        instance_uuid: &str,
        source: &str,
        destination: &str,
    ) -> EngineResult<bool> {
        if source == destination {
            return Ok(false);
        }
        self.node(destination)?;
        match self.placement.get(instance_uuid) {
            Some(host) if host == source => {}
            Some(_) => {
                return Err(EngineError::IllegalArgument(format!(
                    "instance {instance_uuid} is not hosted on {source}"
                )))
            }
            None => return Err(EngineError::InstanceNotFound(instance_uuid.to_string())),
        }

        if let Some(set) = self.hosted.get_mut(source) {
            set.remove(instance_uuid);
        }
        self.hosted
            .entry(destination.to_string())
            .or_default()
            .insert(instance_uuid.to_string());
        self.placement
            .insert(instance_uuid.to_string(), destination.to_string());
        Ok(true)
    }

    /// Drop every node outside `scope`, together with the instances it hosts.
    pub fn restrict(mut self, scope: &Scope) -> Self {
        if scope.is_empty() {
            return self;
        }
        let dropped: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !scope.admits(n))
            .map(|n| n.uuid.clone())
            .collect();
        for node in dropped {
            self.nodes.remove(&node);
            for instance in self.hosted.remove(&node).unwrap_or_default() {
                self.instances.remove(&instance);
                self.placement.remove(&instance);
            }
        }
        self
    }

    /// One line per node, used for debug logging around strategy runs.
    pub fn summary(&self) -> String {
        self.nodes
            .values()
            .map(|n| {
                let used = self.node_used(&n.uuid);
                format!(
                    "{} [{:?}/{}] cpu {}/{} mem {}/{} instances {}",
                    n.hostname,
                    n.state,
                    n.status,
                    used.vcpus,
                    n.capacity.vcpus,
                    used.memory_mb,
                    n.capacity.memory_mb,
                    self.hosted.get(&n.uuid).map_or(0, |s| s.len()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
