//! Plans two `nop` actions. Exercises the audit handlers without touching
//! the cluster.

use serde_json::Value;
use tracing::debug;

use crate::actions::schema::Property;
use crate::actions::{nop, Nop, ObjectSchema, Parameters};
use crate::error::EngineResult;

use super::{Strategy, StrategyRun};

pub const NAME: &str = "dummy";
pub const GOAL: &str = "dummy";

const DEFAULT_PARA1: f64 = 3.2;
const DEFAULT_PARA2: &str = "hello";

#[derive(Debug)]
pub struct DummyStrategy {
    para1: f64,
    para2: String,
}

impl Default for DummyStrategy {
    fn default() -> Self {
        Self {
            para1: DEFAULT_PARA1,
            para2: DEFAULT_PARA2.to_string(),
        }
    }
}

impl Strategy for DummyStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn display_name(&self) -> &'static str {
        "Dummy strategy"
    }

    fn goal(&self) -> &'static str {
        GOAL
    }

    fn schema(&self) -> ObjectSchema {
        ObjectSchema::new()
            .property(Property::number("para1", "number parameter").default_value(Value::from(DEFAULT_PARA1)))
            .property(Property::string("para2", "string parameter").default_value(Value::from(DEFAULT_PARA2)))
    }

    fn configure(&mut self, parameters: &Parameters) -> EngineResult<()> {
        if let Some(para1) = parameters.get("para1").and_then(Value::as_f64) {
            self.para1 = para1;
        }
        if let Some(para2) = parameters.get("para2").and_then(Value::as_str) {
            self.para2 = para2.to_string();
        }
        Ok(())
    }

    fn do_execute(&mut self, run: &mut StrategyRun) -> EngineResult<()> {
        debug!(para1 = self.para1, para2 = %self.para2, "dummy planning");
        run.add_action(nop::ACTION_TYPE, "", Nop::parameters(&format!("Welcome, {}", self.para2)));
        run.add_action(nop::ACTION_TYPE, "", Nop::parameters("Goodbye"));
        Ok(())
    }
}
