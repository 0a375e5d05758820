//! Parameter schemas for actions and strategies.
//!
//! Schemas are declared with a small builder and rendered to JSON Schema
//! (draft 2020-12). Validation is done by `jsonschema` against the rendered
//! document; defaults are filled in here since the validator never mutates.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("schema does not compile: {0}")]
    Compile(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    String {
        min_length: usize,
        allowed: Option<Vec<String>>,
    },
    Number {
        minimum: Option<f64>,
    },
    Integer {
        minimum: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: PropertyKind,
    pub default: Option<Value>,
}

impl Property {
    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: PropertyKind::String {
                min_length: 0,
                allowed: None,
            },
            default: None,
        }
    }

    pub fn number(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: PropertyKind::Number { minimum: None },
            default: None,
        }
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: PropertyKind::Integer { minimum: None },
            default: None,
        }
    }

    /// String property restricted to `values`.
    pub fn one_of<I, S>(name: &'static str, description: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            description,
            kind: PropertyKind::String {
                min_length: 0,
                allowed: Some(values.into_iter().map(Into::into).collect()),
            },
            default: None,
        }
    }

    pub fn min_length(mut self, min: usize) -> Self {
        if let PropertyKind::String { min_length, .. } = &mut self.kind {
            *min_length = min;
        }
        self
    }

    pub fn minimum(mut self, min: i64) -> Self {
        match &mut self.kind {
            PropertyKind::Number { minimum } => *minimum = Some(min as f64),
            PropertyKind::Integer { minimum } => *minimum = Some(min),
            PropertyKind::String { .. } => {}
        }
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("description".into(), json!(self.description));
        match &self.kind {
            PropertyKind::String {
                min_length,
                allowed,
            } => {
                out.insert("type".into(), json!("string"));
                if *min_length > 0 {
                    out.insert("minLength".into(), json!(min_length));
                }
                if let Some(allowed) = allowed {
                    out.insert("enum".into(), json!(allowed));
                }
            }
            PropertyKind::Number { minimum } => {
                out.insert("type".into(), json!("number"));
                if let Some(min) = minimum {
                    out.insert("minimum".into(), json!(min));
                }
            }
            PropertyKind::Integer { minimum } => {
                out.insert("type".into(), json!("integer"));
                if let Some(min) = minimum {
                    out.insert("minimum".into(), json!(min));
                }
            }
        }
        if let Some(default) = &self.default {
            out.insert("default".into(), default.clone());
        }
        Value::Object(out)
    }
}

/// Object schema with `additionalProperties: false`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: Vec<Property>,
    pub required: Vec<&'static str>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn required_property(mut self, property: Property) -> Self {
        self.required.push(property.name);
        self.properties.push(property);
        self
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        let validator = jsonschema::draft202012::options()
            .build(&self.to_json())
            .map_err(|e| SchemaError::Compile(e.to_string()))?;
        let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(errors))
        }
    }

    /// Fill absent properties that declare a default.
    pub fn apply_defaults(&self, object: &mut Map<String, Value>) {
        for property in &self.properties {
            if let Some(default) = &property.default {
                object
                    .entry(property.name.to_string())
                    .or_insert_with(|| default.clone());
            }
        }
    }

    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|p| (p.name.to_string(), p.to_json()))
            .collect();
        let mut out = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        });
        if !self.required.is_empty() {
            out["required"] = json!(self.required);
        }
        out
    }
}
