use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use steward::audit::applier::PlanOnlyApplier;
use steward::audit::{Applier, ApplyReport, DefaultApplier};
use steward::infra::{InfraCall, RecordingClient};
use steward::model::{ClusterModelCollector, FileCollector, Scope};
use steward::solution::Solution;
use steward::strategies::{self, StrategyRegistry};

use super::parse_params;

pub fn run(model: &Path, strategy: &str, params: &[String], apply: bool, format: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(model, strategy, params, apply, format).await })
}

async fn run_async(
    model_path: &Path,
    strategy_name: &str,
    params: &[String],
    apply: bool,
    format: &str,
) -> Result<()> {
    let parameters = parse_params(params)?;
    let mut strategy = StrategyRegistry::default().get(strategy_name)?;

    let model = FileCollector::new(model_path.to_path_buf())
        .collect(&Scope::default())
        .await
        .with_context(|| format!("loading cluster model from {}", model_path.display()))?;

    let solution = strategies::execute(strategy.as_mut(), Some(model), &parameters)
        .with_context(|| format!("running strategy {strategy_name}"))?;

    let client = Arc::new(RecordingClient::new());
    let report = if apply {
        DefaultApplier::new(client.clone()).apply(&solution).await?
    } else {
        PlanOnlyApplier::default().apply(&solution).await?
    };
    let calls = client.calls().await;

    match format {
        "json" => {
            let out = json!({
                "solution": solution,
                "applied": apply,
                "executed": report.executed,
                "reverted": report.reverted,
                "failure": report.fault(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => print_table(&solution, apply, &report, &calls),
    }

    if report.failure.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_table(solution: &Solution, apply: bool, report: &ApplyReport, calls: &[InfraCall]) {
    println!("{}", format!("steward plan — {}", solution.strategy).bold());

    if solution.is_empty() {
        println!("  {}", "nothing to do".green());
    } else {
        println!("  {}", "actions:".bold());
        for (i, action) in solution.actions().iter().enumerate() {
            let params: Vec<String> = action
                .input_parameters
                .iter()
                .map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{k}={s}"),
                    None => format!("{k}={v}"),
                })
                .collect();
            println!(
                "  {:>3}. {:<26} {:<12} {}",
                i + 1,
                action.action_type.cyan(),
                action.resource_id,
                params.join(" ").dimmed()
            );
        }
    }

    if !solution.efficacy.indicators.is_empty() {
        println!("  {}", "efficacy:".bold());
        for indicator in &solution.efficacy.indicators {
            println!("    {:<28} {}", indicator.name, indicator.value);
        }
        println!("    {:<28} {:.1}", "global", solution.efficacy.global);
    }

    if !apply {
        println!("  mode:     {}", "plan only (use --apply to execute)".yellow());
        return;
    }

    println!("  calls:    {}", calls.len());
    for call in calls {
        println!("    {:?}", call);
    }
    match report.fault() {
        None => println!("  result:   {}", "applied".green()),
        Some(fault) => {
            println!("  result:   {}", "failed".red());
            println!("  error:    {}", fault);
            println!("  reverted: {}", report.reverted);
        }
    }
}
