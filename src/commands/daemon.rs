use std::path::PathBuf;

use anyhow::Result;

use steward::config::Config;

pub fn run(
    config_path: Option<PathBuf>,
    log_level: Option<String>,
    tick_secs: Option<u64>,
    apply: bool,
) -> Result<()> {
    let mut config = Config::load(config_path.as_deref())?;

    // CLI flags override config values
    if let Some(level) = log_level {
        config.daemon.log_level = level;
    }
    if let Some(secs) = tick_secs {
        config.daemon.tick_secs = secs;
    }
    if apply {
        config.daemon.apply = true;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(config))
}
