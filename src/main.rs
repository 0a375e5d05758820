mod commands;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "steward", version, about = "Cluster optimization engine: audits, strategies and action plans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a strategy against a cluster model file and print the plan
    Plan {
        /// Cluster model (YAML)
        #[arg(long)]
        model: PathBuf,

        /// Strategy name (see `steward strategies`)
        #[arg(long)]
        strategy: String,

        /// Strategy parameter, repeatable (key=value)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Execute the plan against the recording infrastructure client
        #[arg(long)]
        apply: bool,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// List available strategies and their parameters
    Strategies {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Manage audits in the configured audit store
    Audit {
        /// Path to config file (default: ~/.config/steward/config.yaml)
        #[arg(long, global = true)]
        config: Option<PathBuf>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },

    /// Run the steward daemon (continuous audit scheduler)
    Daemon {
        /// Path to config file (default: ~/.config/steward/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Seconds between scheduler ticks (overrides config)
        #[arg(long)]
        tick_secs: Option<u64>,

        /// Execute planned actions instead of only validating them
        #[arg(long)]
        apply: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            model,
            strategy,
            params,
            apply,
            format,
        } => {
            server::init_tracing("warn", false);
            commands::plan::run(&model, &strategy, &params, apply, &format)
        }
        Commands::Strategies { format } => commands::strategies::run(&format),
        Commands::Audit {
            config,
            format,
            command,
        } => {
            server::init_tracing("warn", false);
            commands::audit::run(config, &format, &command)
        }
        Commands::Daemon {
            config,
            log_level,
            tick_secs,
            apply,
        } => commands::daemon::run(config, log_level, tick_secs, apply),
    }
}
