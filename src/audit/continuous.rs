//! Scheduler for CONTINUOUS audits.
//!
//! Every tick the job table is reconciled against the store: new
//! non-cancelled continuous audits are added with their first run due
//! immediately, cancelled or deleted ones are dropped. Due jobs are spawned
//! as tokio tasks. Distinct audits run concurrently, but an audit whose
//! previous run is still in flight is skipped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineResult;

use super::handler::AuditEngine;
use super::Audit;

struct Job {
    period: Duration,
    next_run: Instant,
    running: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the run ends, however it ends.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What one scheduler tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
    pub launched: Vec<Uuid>,
    /// Due, but the previous run was still in flight.
    pub skipped: Vec<Uuid>,
    pub handles: Vec<JoinHandle<()>>,
}

impl TickReport {
    /// Wait for every run launched by this tick.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "audit task panicked");
            }
        }
    }
}

pub struct ContinuousAuditHandler {
    engine: Arc<AuditEngine>,
    default_interval: Duration,
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl ContinuousAuditHandler {
    pub fn new(engine: Arc<AuditEngine>, default_interval: Duration) -> Self {
        Self {
            engine,
            default_interval,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub async fn scheduled(&self) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = self.jobs.lock().await.keys().copied().collect();
        uuids.sort();
        uuids
    }

    /// One scheduler tick: reconcile the job table and launch due audits.
    pub async fn launch_audits_periodically(&self) -> EngineResult<TickReport> {
        let audits: HashMap<Uuid, Audit> = self
            .engine
            .store()
            .list()
            .await?
            .into_iter()
            .filter(|a| a.is_continuous() && !a.is_cancelled())
            .map(|a| (a.uuid, a))
            .collect();

        let now = Instant::now();
        let mut report = TickReport::default();
        let mut jobs = self.jobs.lock().await;

        jobs.retain(|uuid, _| {
            let keep = audits.contains_key(uuid);
            if !keep {
                report.removed.push(*uuid);
            }
            keep
        });

        for (uuid, audit) in &audits {
            let period = audit.period(self.default_interval);
            match jobs.get_mut(uuid) {
                Some(job) => job.period = period,
                None => {
                    jobs.insert(
                        *uuid,
                        Job {
                            period,
                            next_run: now,
                            running: Arc::new(AtomicBool::new(false)),
                        },
                    );
                    report.added.push(*uuid);
                }
            }
        }

        for (uuid, job) in jobs.iter_mut() {
            if job.next_run > now {
                continue;
            }
            job.next_run = now + job.period;

            let Some(guard) = InFlight::acquire(&job.running) else {
                debug!(audit = %uuid, "previous run still in flight, skipping");
                report.skipped.push(*uuid);
                continue;
            };

            let engine = self.engine.clone();
            let uuid = *uuid;
            report.launched.push(uuid);
            report.handles.push(tokio::spawn(async move {
                let _guard = guard;
                match engine.execute_audit(uuid).await {
                    Ok(outcome) => {
                        debug!(audit = %uuid, state = %outcome.audit.state, "continuous run finished")
                    }
                    Err(e) => warn!(audit = %uuid, error = %e, "continuous run failed"),
                }
            }));
        }

        for uuid in &report.removed {
            info!(audit = %uuid, "audit unscheduled");
        }
        for uuid in &report.added {
            info!(audit = %uuid, "audit scheduled");
        }
        Ok(report)
    }

    /// Tick every `tick` until `shutdown` resolves. Tick failures are logged
    /// and retried on the next tick.
    pub async fn run(self: Arc<Self>, tick: Duration, shutdown: impl Future<Output = ()>) {
        info!(
            tick_secs = tick.as_secs(),
            default_interval_secs = self.default_interval.as_secs(),
            "continuous audit handler started"
        );
        let mut interval = tokio::time::interval(tick);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.launch_audits_periodically().await {
                        warn!(error = %e, "audit tick failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("continuous audit handler stopping");
                    break;
                }
            }
        }
    }
}
