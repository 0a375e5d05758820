//! Strategies: pluggable planners that turn a cluster model into a solution.
//!
//! Every strategy goes through the same lifecycle, driven by [`execute`]:
//!
//! 1. parameters are validated against [`Strategy::schema`] and defaulted
//! 2. `pre_execute`: the model must be present and fresh
//! 3. `do_execute`: planning only, actions are appended to the solution
//! 4. `post_execute`: the final model is attached and efficacy computed
//!
//! Strategies never call infrastructure; they only plan.

pub mod basic_power_save;
pub mod dummy;
pub mod node_maintenance;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::actions::{ObjectSchema, Parameters};
use crate::error::{EngineError, EngineResult};
use crate::model::collector::COMPUTE_COLLECTOR;
use crate::model::ClusterModel;
use crate::solution::Solution;

pub use basic_power_save::BasicPowerSave;
pub use dummy::DummyStrategy;
pub use node_maintenance::NodeMaintenance;

/// State of one strategy execution: the run's own model snapshot and the
/// solution under construction.
pub struct StrategyRun {
    model: Option<ClusterModel>,
    solution: Solution,
}

impl StrategyRun {
    pub fn new(strategy: &str, model: Option<ClusterModel>) -> Self {
        Self {
            model,
            solution: Solution::new(strategy),
        }
    }

    /// The model, provided it exists and is not stale.
    pub fn ensure_model_ready(&self) -> EngineResult<&ClusterModel> {
        let model = self.model()?;
        if model.is_stale() {
            return Err(EngineError::ClusterStateStale);
        }
        Ok(model)
    }

    pub fn model(&self) -> EngineResult<&ClusterModel> {
        self.model.as_ref().ok_or(EngineError::ClusterStateNotDefined)
    }

    pub fn model_mut(&mut self) -> EngineResult<&mut ClusterModel> {
        self.model.as_mut().ok_or(EngineError::ClusterStateNotDefined)
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn solution_mut(&mut self) -> &mut Solution {
        &mut self.solution
    }

    pub fn add_action(&mut self, action_type: &str, resource_id: &str, parameters: Parameters) {
        self.solution.add_action(action_type, resource_id, parameters);
    }

    pub fn attach_model(&mut self) {
        self.solution.model = self.model.clone();
    }

    pub fn into_solution(self) -> Solution {
        self.solution
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Goal this strategy serves; used to pick a strategy when an audit names
    /// only a goal.
    fn goal(&self) -> &'static str;

    fn schema(&self) -> ObjectSchema;

    /// Name of the cluster model collector this strategy plans on.
    fn collector(&self) -> &'static str {
        COMPUTE_COLLECTOR
    }

    /// Read already validated and defaulted parameters.
    fn configure(&mut self, parameters: &Parameters) -> EngineResult<()>;

    fn pre_execute(&mut self, run: &StrategyRun) -> EngineResult<()> {
        run.ensure_model_ready().map(|_| ())
    }

    fn do_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()>;

    fn post_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()> {
        run.attach_model();
        Ok(())
    }
}

/// Validate raw audit parameters against the strategy schema and fill defaults.
pub fn prepare_parameters(strategy: &dyn Strategy, raw: &Parameters) -> EngineResult<Parameters> {
    let schema = strategy.schema();
    schema
        .validate(&Value::Object(raw.clone()))
        .map_err(|e| EngineError::schema(format!("strategy {}", strategy.name()), e))?;
    let mut parameters = raw.clone();
    schema.apply_defaults(&mut parameters);
    Ok(parameters)
}

/// Run the full strategy lifecycle on `model`.
pub fn execute(
    strategy: &mut dyn Strategy,
    model: Option<ClusterModel>,
    parameters: &Parameters,
) -> EngineResult<Solution> {
    let parameters = prepare_parameters(strategy, parameters)?;
    strategy.configure(&parameters)?;

    let mut run = StrategyRun::new(strategy.name(), model);
    strategy.pre_execute(&run)?;
    if let Ok(model) = run.model() {
        debug!(strategy = strategy.name(), "planning on model:\n{}", model.summary());
    }
    strategy.do_execute(&mut run)?;
    strategy.post_execute(&mut run)?;

    let solution = run.into_solution();
    debug!(
        strategy = strategy.name(),
        actions = solution.actions().len(),
        efficacy = solution.efficacy.global,
        "strategy finished"
    );
    Ok(solution)
}

type StrategyFactory = fn() -> Box<dyn Strategy>;

/// Maps strategy names to constructors.
pub struct StrategyRegistry {
    factories: BTreeMap<&'static str, StrategyFactory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
            .register(node_maintenance::NAME, || Box::new(NodeMaintenance::default()))
            .register(basic_power_save::NAME, || Box::new(BasicPowerSave::default()))
            .register(dummy::NAME, || Box::new(DummyStrategy::default()))
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: &'static str, factory: StrategyFactory) -> Self {
        self.factories.insert(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> EngineResult<Box<dyn Strategy>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::StrategyNotFound(name.to_string()))
    }

    /// Pick the named strategy, or the first registered strategy for `goal`.
    pub fn select(&self, goal: &str, strategy: Option<&str>) -> EngineResult<Box<dyn Strategy>> {
        match strategy {
            Some(name) => self.get(name),
            None => self
                .factories
                .values()
                .map(|factory| factory())
                .find(|s| s.goal() == goal)
                .ok_or_else(|| EngineError::StrategyNotFound(format!("<goal {goal}>"))),
        }
    }

    pub fn all(&self) -> Vec<Box<dyn Strategy>> {
        self.factories.values().map(|factory| factory()).collect()
    }
}
