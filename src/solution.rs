//! Solutions: the ordered plan a strategy run produces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ClusterModel;

/// One planned action. List order is execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_type: String,
    pub resource_id: String,
    #[serde(default)]
    pub input_parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Efficacy {
    pub indicators: Vec<Indicator>,
    /// Strategy-specific global score, 0–100.
    pub global: f64,
}

impl Efficacy {
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub strategy: String,
    actions: Vec<PlannedAction>,
    /// Model the plan ends in. Attached by `post_execute`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ClusterModel>,
    pub efficacy: Efficacy,
}

impl Solution {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            actions: Vec::new(),
            model: None,
            efficacy: Efficacy::default(),
        }
    }

    pub fn add_action(
        &mut self,
        action_type: &str,
        resource_id: &str,
        input_parameters: Map<String, Value>,
    ) {
        self.actions.push(PlannedAction {
            action_type: action_type.to_string(),
            resource_id: resource_id.to_string(),
            input_parameters,
        });
    }

    pub fn extend(&mut self, actions: impl IntoIterator<Item = PlannedAction>) {
        self.actions.extend(actions);
    }

    pub fn actions(&self) -> &[PlannedAction] {
        &self.actions
    }

    pub fn count(&self, action_type: &str) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    pub fn add_indicator(&mut self, name: &str, value: f64, unit: &str) {
        self.efficacy.indicators.push(Indicator {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
