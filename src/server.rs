use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use steward::audit::applier::PlanOnlyApplier;
use steward::audit::{Applier, AuditEngine, ContinuousAuditHandler, DefaultApplier, FileAuditStore};
use steward::infra::RecordingClient;
use steward::model::collector::COMPUTE_COLLECTOR;
use steward::model::{CollectorManager, FileCollector};
use steward::notifications::{LogSink, NotificationSink, Notifier, WebhookSink};
use steward::strategies::StrategyRegistry;

use steward::config::Config;

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Wire the engine from configuration: file-backed audits and cluster model,
/// log and webhook notifications.
pub fn build_engine(config: &Config) -> AuditEngine {
    let collectors = CollectorManager::new().with_collector(
        COMPUTE_COLLECTOR,
        Arc::new(FileCollector::new(config.daemon.model_file.clone())),
    );

    let applier: Arc<dyn Applier> = if config.daemon.apply {
        Arc::new(DefaultApplier::new(Arc::new(RecordingClient::new())))
    } else {
        Arc::new(PlanOnlyApplier::default())
    };

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
    if config.notifications.enabled {
        if let Some(url) = &config.notifications.webhook_url {
            sinks.push(Arc::new(WebhookSink::new(url)));
        }
    }

    AuditEngine::new(
        Arc::new(FileAuditStore::new(config.daemon.audit_store.clone())),
        Arc::new(collectors),
        Arc::new(StrategyRegistry::default()),
        applier,
        Notifier::new(sinks),
    )
}

pub async fn run(config: Config) -> Result<()> {
    init_tracing(&config.daemon.log_level, true);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        audit_store = %config.daemon.audit_store.display(),
        model_file = %config.daemon.model_file.display(),
        apply = config.daemon.apply,
        "Steward daemon starting"
    );

    let engine = Arc::new(build_engine(&config));
    let handler = Arc::new(ContinuousAuditHandler::new(
        engine,
        Duration::from_secs(config.daemon.default_interval_secs),
    ));

    handler
        .run(Duration::from_secs(config.daemon.tick_secs.max(1)), shutdown_signal())
        .await;

    info!("Steward daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
