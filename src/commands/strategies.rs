use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use steward::strategies::StrategyRegistry;

pub fn run(format: &str) -> Result<()> {
    let registry = StrategyRegistry::default();
    let strategies = registry.all();

    match format {
        "json" => {
            let out: Vec<_> = strategies
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name(),
                        "display_name": s.display_name(),
                        "goal": s.goal(),
                        "collector": s.collector(),
                        "parameters": s.schema().to_json(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            println!("{}", "steward strategies".bold());
            for s in &strategies {
                println!("  {:<20} {:<22} goal: {}", s.name().cyan(), s.display_name(), s.goal());
                for property in &s.schema().properties {
                    let default = property
                        .default
                        .as_ref()
                        .map(|d| format!(" (default {d})"))
                        .unwrap_or_default();
                    println!("      {:<12} {}{}", property.name, property.description, default.dimmed());
                }
            }
        }
    }
    Ok(())
}
