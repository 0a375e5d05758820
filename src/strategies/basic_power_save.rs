//! Keep a fixed number of idle nodes powered on as standby.
//!
//! Idle nodes are online and disabled. Nodes beyond the standby count are
//! powered off, and powered-off nodes are brought back when the pool runs
//! short. Which nodes are picked is random.

use rand::seq::IndexedRandom;
use serde_json::Value;
use tracing::{info, warn};

use crate::actions::schema::Property;
use crate::actions::{change_node_power_state, change_node_service_state, ChangeNodePowerState, ChangeNodeServiceState, ObjectSchema, Parameters};
use crate::error::{EngineError, EngineResult};
use crate::infra::PowerState;
use crate::model::{NodeState, ServiceStatus};

use super::{Strategy, StrategyRun};

pub const NAME: &str = "basic_power_save";
pub const GOAL: &str = "saving_energy";

const STANDBY: &str = "standby";
const DEFAULT_STANDBY: usize = 1;

#[derive(Debug)]
pub struct BasicPowerSave {
    standby: usize,
}

impl Default for BasicPowerSave {
    fn default() -> Self {
        Self {
            standby: DEFAULT_STANDBY,
        }
    }
}

impl BasicPowerSave {
    fn power_off(run: &mut StrategyRun, node: &str) {
        run.add_action(
            change_node_service_state::ACTION_TYPE,
            node,
            ChangeNodeServiceState::parameters(ServiceStatus::Disabled, ServiceStatus::PowerOff),
        );
        run.add_action(
            change_node_power_state::ACTION_TYPE,
            node,
            ChangeNodePowerState::parameters(PowerState::Off),
        );
    }

    fn power_on(run: &mut StrategyRun, node: &str) {
        run.add_action(
            change_node_service_state::ACTION_TYPE,
            node,
            ChangeNodeServiceState::parameters(ServiceStatus::PowerOff, ServiceStatus::PowerOn),
        );
        run.add_action(
            change_node_power_state::ACTION_TYPE,
            node,
            ChangeNodePowerState::parameters(PowerState::On),
        );
    }

    fn powered(run: &StrategyRun, state: PowerState) -> usize {
        run.solution()
            .actions()
            .iter()
            .filter(|a| a.action_type == change_node_power_state::ACTION_TYPE)
            .filter(|a| a.input_parameters.get("state").and_then(Value::as_str) == Some(state.as_str()))
            .count()
    }
}

impl Strategy for BasicPowerSave {
    fn name(&self) -> &'static str {
        NAME
    }

    fn display_name(&self) -> &'static str {
        "Basic power save"
    }

    fn goal(&self) -> &'static str {
        GOAL
    }

    fn schema(&self) -> ObjectSchema {
        ObjectSchema::new().property(
            Property::integer(STANDBY, "number of idle nodes kept powered on")
                .minimum(0)
                .default_value(Value::from(DEFAULT_STANDBY)),
        )
    }

    fn configure(&mut self, parameters: &Parameters) -> EngineResult<()> {
        self.standby = match parameters.get(STANDBY) {
            None => DEFAULT_STANDBY,
            Some(value) => value
                .as_f64()
                .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                .map(|n| n as usize)
                .ok_or_else(|| {
                    EngineError::IllegalArgument(format!("{STANDBY} must be a whole number >= 0, got {value}"))
                })?,
        };
        Ok(())
    }

    fn pre_execute(&mut self, run: &StrategyRun) -> EngineResult<()> {
        let model = run.ensure_model_ready()?;
        let stuck: Vec<&str> = model
            .nodes()
            .filter(|n| n.status == ServiceStatus::PowerOn && !n.is_online())
            .map(|n| n.hostname.as_str())
            .collect();
        if !stuck.is_empty() {
            warn!(nodes = ?stuck, "nodes were powered on but are not online yet");
        }
        Ok(())
    }

    fn do_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()> {
        let model = run.model()?;
        let unused: Vec<String> = model
            .nodes()
            .filter(|n| n.is_online() && n.status == ServiceStatus::Disabled)
            .map(|n| n.uuid.clone())
            .collect();
        let powered_off: Vec<String> = model
            .nodes()
            .filter(|n| n.state == NodeState::Offline && n.status == ServiceStatus::PowerOff)
            .map(|n| n.uuid.clone())
            .collect();

        let mut rng = rand::rng();
        if unused.len() > self.standby {
            let surplus = unused.len() - self.standby;
            info!(surplus, standby = self.standby, "powering off idle nodes");
            for node in unused.choose_multiple(&mut rng, surplus) {
                Self::power_off(run, node);
            }
        } else if unused.len() < self.standby {
            let wanted = (self.standby - unused.len()).min(powered_off.len());
            info!(wanted, standby = self.standby, "powering on standby nodes");
            for node in powered_off.choose_multiple(&mut rng, wanted) {
                Self::power_on(run, node);
            }
        }
        Ok(())
    }

    fn post_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()> {
        run.attach_model();
        let off = Self::powered(run, PowerState::Off);
        let on = Self::powered(run, PowerState::On);
        let model = run.model()?;
        let total = model.node_count();
        let already_off = model
            .nodes()
            .filter(|n| n.status == ServiceStatus::PowerOff)
            .count();

        let solution = run.solution_mut();
        solution.add_indicator("nodes_powered_off_count", off as f64, "");
        solution.add_indicator("nodes_powered_on_count", on as f64, "");
        solution.efficacy.global = if total == 0 {
            0.0
        } else {
            ((already_off + off).saturating_sub(on)) as f64 * 100.0 / total as f64
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::model::ClusterModel;
    use crate::model::NodeState::{Offline, Online};
    use crate::model::ServiceStatus::{Disabled, Enabled, PowerOff};
    use crate::strategies::execute;
    use crate::strategies::testing::node;
    use serde_json::json;

    fn standby(n: u64) -> Parameters {
        json!({ "standby": n }).as_object().unwrap().clone()
    }

    fn pairs(solution: &crate::solution::Solution) -> Vec<Vec<(String, String)>> {
        solution
            .actions()
            .chunks(2)
            .map(|c| {
                c.iter()
                    .map(|a| (a.action_type.clone(), a.resource_id.clone()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn surplus_idle_nodes_are_powered_off() {
        let mut model = ClusterModel::new();
        for id in ["n1", "n2", "n3"] {
            model.add_node(node(id, 8, 16384, Online, Disabled));
        }
        model.add_node(node("busy", 8, 16384, Online, Enabled));

        let mut strategy = BasicPowerSave::default();
        let solution = execute(&mut strategy, Some(model), &standby(1)).unwrap();

        assert_eq!(solution.actions().len(), 4);
        let mut targets = Vec::new();
        for pair in pairs(&solution) {
            assert_eq!(pair[0].0, "change_node_service_state");
            assert_eq!(pair[1].0, "change_node_power_state");
            assert_eq!(pair[0].1, pair[1].1);
            targets.push(pair[0].1.clone());
        }
        targets.dedup();
        assert_eq!(targets.len(), 2);
        assert!(!targets.contains(&"busy".to_string()));

        let first = &solution.actions()[0].input_parameters;
        assert_eq!(first["current"], "disabled");
        assert_eq!(first["target"], "poweroff");
        assert_eq!(solution.actions()[1].input_parameters["state"], "off");
        assert_eq!(solution.efficacy.indicator("nodes_powered_off_count"), Some(2.0));
    }

    #[test]
    fn missing_standby_nodes_are_powered_on() {
        let mut model = ClusterModel::new();
        model.add_node(node("idle", 8, 16384, Online, Disabled));
        model.add_node(node("p1", 8, 16384, Offline, PowerOff));
        model.add_node(node("p2", 8, 16384, Offline, PowerOff));
        model.add_node(node("p3", 8, 16384, Offline, PowerOff));

        let mut strategy = BasicPowerSave::default();
        let solution = execute(&mut strategy, Some(model), &standby(3)).unwrap();
        assert_eq!(solution.actions().len(), 4);
        for pair in solution.actions().chunks(2) {
            assert_eq!(pair[0].input_parameters["target"], "poweron");
            assert_eq!(pair[1].input_parameters["state"], "on");
            assert_ne!(pair[0].resource_id, "idle");
        }
    }

    #[test]
    fn power_on_is_capped_by_available_nodes() {
        let mut model = ClusterModel::new();
        model.add_node(node("p1", 8, 16384, Offline, PowerOff));
        // online poweroff nodes are not candidates
        model.add_node(node("p2", 8, 16384, Online, PowerOff));

        let mut strategy = BasicPowerSave::default();
        let solution = execute(&mut strategy, Some(model), &standby(5)).unwrap();
        assert_eq!(solution.actions().len(), 2);
        assert_eq!(solution.actions()[0].resource_id, "p1");
    }

    #[test]
    fn balanced_pool_plans_nothing() {
        let mut model = ClusterModel::new();
        model.add_node(node("n1", 8, 16384, Online, Disabled));
        model.add_node(node("p1", 8, 16384, Offline, PowerOff));

        let mut strategy = BasicPowerSave::default();
        let solution = execute(&mut strategy, Some(model), &Parameters::new()).unwrap();
        assert!(solution.is_empty());
    }

    #[test]
    fn negative_standby_is_rejected() {
        let mut strategy = BasicPowerSave::default();
        let params = json!({ "standby": -1 }).as_object().unwrap().clone();
        let err = execute(&mut strategy, Some(ClusterModel::new()), &params).unwrap_err();
        assert!(matches!(err, EngineError::SchemaValidation { .. }));
    }

    #[test]
    fn fractional_standby_is_rejected() {
        let mut strategy = BasicPowerSave::default();
        let params = json!({ "standby": 1.5 }).as_object().unwrap().clone();
        let err = execute(&mut strategy, Some(ClusterModel::new()), &params).unwrap_err();
        assert!(matches!(err, EngineError::SchemaValidation { .. }));

        let err = strategy.configure(&params).unwrap_err();
        assert!(matches!(err, EngineError::IllegalArgument(_)));

        let whole = json!({ "standby": 2.0 }).as_object().unwrap().clone();
        strategy.configure(&whole).unwrap();
        assert_eq!(strategy.standby, 2);
    }
}
