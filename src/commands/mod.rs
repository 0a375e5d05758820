pub mod audit;
pub mod daemon;
pub mod plan;
pub mod strategies;

use anyhow::{bail, Result};
use serde_json::Value;

use steward::actions::Parameters;

/// Parse repeated `key=value` flags. Values that read as JSON (numbers,
/// booleans, quoted strings) keep their type; anything else is a string.
pub fn parse_params(raw: &[String]) -> Result<Parameters> {
    let mut params = Parameters::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("parameter '{entry}' is not of the form key=value");
        };
        if key.is_empty() {
            bail!("parameter '{entry}' has an empty key");
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
