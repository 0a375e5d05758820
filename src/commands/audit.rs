use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use steward::audit::{Audit, AuditState, AuditType, OneShotAuditHandler};
use steward::config::Config;
use steward::model::Scope;

use super::parse_params;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List stored audits
    List,
    /// Create an audit
    Create {
        /// Human readable name
        #[arg(long)]
        name: String,

        /// oneshot or continuous
        #[arg(long = "type", default_value = "oneshot")]
        audit_type: String,

        /// Goal to achieve (cluster_maintaining, saving_energy, dummy)
        #[arg(long)]
        goal: String,

        /// Strategy to use instead of the goal's default
        #[arg(long)]
        strategy: Option<String>,

        /// Strategy parameter, repeatable (key=value)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Seconds between runs (continuous only)
        #[arg(long)]
        interval: Option<u64>,

        /// Restrict the model to these nodes (uuid or hostname), repeatable
        #[arg(long)]
        include: Vec<String>,

        /// Exclude these nodes from the model, repeatable
        #[arg(long)]
        exclude: Vec<String>,

        /// Run a one-shot audit immediately after creating it
        #[arg(long)]
        run: bool,
    },
    /// Cancel an audit; continuous audits stop at the daemon's next tick
    Cancel {
        uuid: String,
    },
    /// Run a one-shot audit now
    Run {
        uuid: String,
    },
}

pub fn run(config_path: Option<PathBuf>, format: &str, command: &AuditCommands) -> Result<()> {
    let config = Config::load(config_path.as_deref())?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(&config, format, command).await })
}

async fn run_async(config: &Config, format: &str, command: &AuditCommands) -> Result<()> {
    let engine = std::sync::Arc::new(crate::server::build_engine(config));

    match command {
        AuditCommands::List => {
            let mut audits = engine.store().list().await?;
            audits.sort_by_key(|a| a.created_at);
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&audits)?);
                return Ok(());
            }
            println!("{}", "steward audits".bold());
            if audits.is_empty() {
                println!("  (none)");
            }
            for audit in &audits {
                print_audit_line(audit);
            }
        }
        AuditCommands::Create {
            name,
            audit_type,
            goal,
            strategy,
            params,
            interval,
            include,
            exclude,
            run,
        } => {
            let audit_type = match audit_type.to_lowercase().as_str() {
                "oneshot" => AuditType::Oneshot,
                "continuous" => AuditType::Continuous,
                other => bail!("unknown audit type '{other}' (expected oneshot or continuous)"),
            };
            let mut audit = Audit::new(name, audit_type, goal)
                .with_parameters(parse_params(params)?)
                .with_scope(Scope {
                    include: include.clone(),
                    exclude: exclude.clone(),
                });
            if let Some(strategy) = strategy {
                audit = audit.with_strategy(strategy);
            }
            if let Some(secs) = interval {
                audit = audit.with_interval(*secs);
            }

            let audit = engine.create_audit(audit).await?;
            if *run && audit_type == AuditType::Oneshot {
                let outcome = OneShotAuditHandler::new(engine.clone())
                    .launch_audit(audit.uuid)
                    .await?;
                print_result(&outcome.audit, format)?;
            } else {
                print_result(&audit, format)?;
            }
        }
        AuditCommands::Cancel { uuid } => {
            let audit = engine.cancel_audit(parse_uuid(uuid)?).await?;
            print_result(&audit, format)?;
        }
        AuditCommands::Run { uuid } => {
            let outcome = OneShotAuditHandler::new(engine.clone())
                .launch_audit(parse_uuid(uuid)?)
                .await?;
            print_result(&outcome.audit, format)?;
            if outcome.audit.state == AuditState::Failed {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("'{raw}' is not an audit uuid"))
}

fn colored_state(state: AuditState) -> String {
    let s = state.as_str();
    match state {
        AuditState::Succeeded => s.green().to_string(),
        AuditState::Failed => s.red().to_string(),
        AuditState::Cancelled => s.dimmed().to_string(),
        AuditState::Ongoing => s.yellow().to_string(),
        AuditState::Pending => s.to_string(),
    }
}

fn print_audit_line(audit: &Audit) {
    let interval = audit
        .interval
        .map(|s| format!("every {s}s"))
        .unwrap_or_default();
    println!(
        "  {}  {:<10} {:<11} {:<20} {:<18} {}",
        audit.uuid,
        colored_state(audit.state),
        audit.audit_type.to_string(),
        audit.goal,
        audit.name,
        interval.dimmed()
    );
}

fn print_result(audit: &Audit, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(audit)?);
        return Ok(());
    }
    println!("{}", "steward audit".bold());
    println!("  uuid:     {}", audit.uuid);
    println!("  name:     {}", audit.name);
    println!("  type:     {}", audit.audit_type);
    println!("  goal:     {}", audit.goal);
    if let Some(strategy) = &audit.strategy {
        println!("  strategy: {}", strategy);
    }
    println!("  state:    {}", colored_state(audit.state));
    if let Some(error) = &audit.last_error {
        println!("  error:    {}", error.red());
    }
    Ok(())
}
