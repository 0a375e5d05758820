//! Drain one compute node so it can be taken down for maintenance.
//!
//! Safe mode moves every instance onto a single spare (online, disabled)
//! node that can absorb the whole load. When no spare is big enough the
//! strategy falls back to best effort: instances are spread first-fit over
//! every online node that is enabled or disabled. Either way the drained node
//! ends in `maintaining`. A best-effort plan that cannot place every instance
//! is dropped entirely.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::actions::schema::Property;
use crate::actions::{change_node_service_state, migrate, ChangeNodeServiceState, Migrate, ObjectSchema, Parameters};
use crate::error::{EngineError, EngineResult};
use crate::infra::MigrationType;
use crate::model::{ClusterModel, Instance, InstanceState, Node, ServiceStatus};
use crate::solution::PlannedAction;

use super::{Strategy, StrategyRun};

pub const NAME: &str = "node_maintenance";
pub const GOAL: &str = "cluster_maintaining";

const NODE: &str = "node";

#[derive(Debug, Default)]
pub struct NodeMaintenance {
    node: String,
}

/// Actions planned against a scratch copy of the model. Only committed to
/// the run once the whole evacuation succeeded.
struct Evacuation {
    model: ClusterModel,
    actions: Vec<PlannedAction>,
    enabled: BTreeSet<String>,
}

impl Evacuation {
    fn new(model: ClusterModel) -> Self {
        Self {
            model,
            actions: Vec::new(),
            enabled: BTreeSet::new(),
        }
    }

    fn change_state(&mut self, node: &Node, target: ServiceStatus) {
        self.actions.push(PlannedAction {
            action_type: change_node_service_state::ACTION_TYPE.to_string(),
            resource_id: node.uuid.clone(),
            input_parameters: ChangeNodeServiceState::parameters(node.status, target),
        });
    }

    fn enable_once(&mut self, node: &Node) {
        if node.status != ServiceStatus::Enabled && self.enabled.insert(node.uuid.clone()) {
            self.change_state(node, ServiceStatus::Enabled);
        }
    }

    fn migrate(&mut self, instance: &Instance, source: &Node, destination: &Node) -> EngineResult<()> {
        let kind = if instance.state == InstanceState::Active {
            MigrationType::Live
        } else {
            MigrationType::Cold
        };
        self.enable_once(destination);
        if self
            .model
            .migrate_instance(&instance.uuid, &source.uuid, &destination.uuid)?
        {
            self.actions.push(PlannedAction {
                action_type: migrate::ACTION_TYPE.to_string(),
                resource_id: instance.uuid.clone(),
                input_parameters: Migrate::parameters(kind, &source.uuid, &destination.uuid),
            });
        }
        Ok(())
    }

    fn hosted(&self, node: &Node) -> Vec<Instance> {
        self.model
            .node_instances(&node.uuid)
            .into_iter()
            .cloned()
            .collect()
    }
}

impl NodeMaintenance {
    /// Spare nodes, smallest first.
    fn spare_nodes(model: &ClusterModel, source: &Node) -> Vec<Node> {
        let mut nodes: Vec<Node> = model
            .nodes()
            .filter(|n| n.uuid != source.uuid)
            .filter(|n| n.is_online() && n.status == ServiceStatus::Disabled)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.capacity.vcpus);
        nodes
    }

    /// Every node that may take workload, least free cpu first.
    fn available_nodes(model: &ClusterModel, source: &Node) -> Vec<Node> {
        let mut nodes: Vec<Node> = model
            .nodes()
            .filter(|n| n.uuid != source.uuid && n.is_online())
            .filter(|n| matches!(n.status, ServiceStatus::Enabled | ServiceStatus::Disabled))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| model.node_free(n).vcpus);
        nodes
    }

    fn safe_maintain(plan: &mut Evacuation, source: &Node) -> EngineResult<bool> {
        let used = plan.model.node_used(&source.uuid);
        let destination = Self::spare_nodes(&plan.model, source)
            .into_iter()
            .find(|n| used.fits_within(&plan.model.node_free(n)));
        let Some(destination) = destination else {
            return Ok(false);
        };

        debug!(source = %source.hostname, destination = %destination.hostname, "safe evacuation");
        for instance in plan.hosted(source) {
            plan.migrate(&instance, source, &destination)?;
        }
        plan.change_state(source, ServiceStatus::Maintaining);
        Ok(true)
    }

    fn best_effort_maintain(plan: &mut Evacuation, source: &Node) -> EngineResult<()> {
        let destinations = Self::available_nodes(&plan.model, source);
        let mut instances = plan.hosted(source);
        instances.sort_by_key(|i| i.demand.vcpus);

        for instance in &instances {
            let target = destinations
                .iter()
                .find(|n| instance.demand.fits_within(&plan.model.node_free(n)))
                .cloned();
            match target {
                Some(destination) => plan.migrate(instance, source, &destination)?,
                None => {
                    return Err(EngineError::SolutionNotFound {
                        strategy: NAME.to_string(),
                        reason: format!(
                            "no node can take instance {} from {}",
                            instance.uuid, source.hostname
                        ),
                    })
                }
            }
        }
        plan.change_state(source, ServiceStatus::Maintaining);
        Ok(())
    }
}

impl Strategy for NodeMaintenance {
    fn name(&self) -> &'static str {
        NAME
    }

    fn display_name(&self) -> &'static str {
        "Node maintenance"
    }

    fn goal(&self) -> &'static str {
        GOAL
    }

    fn schema(&self) -> ObjectSchema {
        ObjectSchema::new().property(
            Property::string(NODE, "uuid or hostname of the node to drain")
                .default_value(Value::String(String::new())),
        )
    }

    fn configure(&mut self, parameters: &Parameters) -> EngineResult<()> {
        self.node = parameters
            .get(NODE)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(())
    }

    fn do_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()> {
        if self.node.is_empty() {
            warn!("no maintenance node given, nothing to plan");
            return Ok(());
        }

        let model = run.model()?;
        let source = model.find_node(&self.node)?.clone();
        let mut plan = Evacuation::new(model.clone());

        if model.node_instances(&source.uuid).is_empty() {
            info!(node = %source.hostname, "node is empty, switching it to maintaining");
            plan.change_state(&source, ServiceStatus::Maintaining);
        } else if !Self::safe_maintain(&mut plan, &source)? {
            info!(node = %source.hostname, "no spare node fits, falling back to best effort");
            plan = Evacuation::new(model.clone());
            Self::best_effort_maintain(&mut plan, &source)?;
        }

        *run.model_mut()? = plan.model;
        run.solution_mut().extend(plan.actions);
        Ok(())
    }

    fn post_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()> {
        run.attach_model();
        let migrations = run.solution().count(migrate::ACTION_TYPE);
        let state_changes = run.solution().count(change_node_service_state::ACTION_TYPE);
        let drained = match run.model()?.find_node(&self.node) {
            Ok(node) => run.model()?.node_instances(&node.uuid).is_empty(),
            Err(_) => false,
        };

        let solution = run.solution_mut();
        solution.add_indicator("instance_migrations_count", migrations as f64, "");
        solution.add_indicator("node_state_changes_count", state_changes as f64, "");
        solution.efficacy.global = if drained { 100.0 } else { 0.0 };
        Ok(())
    }
}
