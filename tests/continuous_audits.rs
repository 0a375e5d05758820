use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use steward::audit::applier::PlanOnlyApplier;
use steward::audit::{Audit, AuditEngine, AuditState, AuditStore, AuditType, ContinuousAuditHandler, InMemoryAuditStore};
use steward::model::collector::COMPUTE_COLLECTOR;
use steward::model::{ClusterModel, ClusterModelCollector, CollectorManager, Scope, StaticCollector};
use steward::notifications::{EventType, MemorySink, Notifier};
use steward::strategies::StrategyRegistry;
use steward::{EngineError, EngineResult};
use uuid::Uuid;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Blocks every collection until released.
struct GatedCollector {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ClusterModelCollector for GatedCollector {
    async fn collect(&self, _scope: &Scope) -> EngineResult<ClusterModel> {
        self.gate.acquire().await.unwrap().forget();
        Ok(ClusterModel::new())
    }
}

struct Harness {
    store: Arc<InMemoryAuditStore>,
    engine: Arc<AuditEngine>,
    handler: ContinuousAuditHandler,
    sink: Arc<MemorySink>,
}

fn harness(collector: Arc<dyn ClusterModelCollector>) -> Harness {
    let store = Arc::new(InMemoryAuditStore::new());
    let sink = Arc::new(MemorySink::new());
    let engine = Arc::new(AuditEngine::new(
        store.clone(),
        Arc::new(CollectorManager::new().with_collector(COMPUTE_COLLECTOR, collector)),
        Arc::new(StrategyRegistry::default()),
        Arc::new(PlanOnlyApplier::default()),
        Notifier::default().with_sink(sink.clone()),
    ));
    let handler = ContinuousAuditHandler::new(engine.clone(), DEFAULT_INTERVAL);
    Harness {
        store,
        engine,
        handler,
        sink,
    }
}

fn static_harness() -> Harness {
    harness(Arc::new(StaticCollector::new(ClusterModel::new())))
}

async fn continuous(h: &Harness, interval: Option<u64>) -> Uuid {
    let mut audit = Audit::new("loop", AuditType::Continuous, "dummy");
    if let Some(secs) = interval {
        audit = audit.with_interval(secs);
    }
    h.engine.create_audit(audit).await.unwrap().uuid
}

/// Let spawned runs progress until they block.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn state(h: &Harness, uuid: Uuid) -> AuditState {
    h.store.get_by_uuid(uuid).await.unwrap().state
}

#[tokio::test(start_paused = true)]
async fn first_run_is_immediate_and_then_follows_the_interval() {
    let h = static_harness();
    let uuid = continuous(&h, Some(60)).await;

    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(tick.added, vec![uuid]);
    assert_eq!(tick.launched, vec![uuid]);
    tick.join().await;
    assert_eq!(state(&h, uuid).await, AuditState::Succeeded);

    tokio::time::advance(Duration::from_secs(30)).await;
    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert!(tick.launched.is_empty());

    tokio::time::advance(Duration::from_secs(30)).await;
    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(tick.launched, vec![uuid]);
    tick.join().await;

    // PENDING→ONGOING→SUCCEEDED, then SUCCEEDED→ONGOING→SUCCEEDED
    let updates: Vec<_> = h
        .sink
        .received()
        .await
        .into_iter()
        .filter(|n| n.event_type == EventType::AuditUpdate)
        .map(|n| (n.payload.old_state, n.payload.state))
        .collect();
    assert_eq!(
        updates,
        vec![
            (Some(AuditState::Pending), AuditState::Ongoing),
            (Some(AuditState::Ongoing), AuditState::Succeeded),
            (Some(AuditState::Succeeded), AuditState::Ongoing),
            (Some(AuditState::Ongoing), AuditState::Succeeded),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn audit_left_ongoing_is_run_again() {
    let h = static_harness();
    let mut audit = Audit::new("interrupted", AuditType::Continuous, "dummy").with_interval(60);
    audit.state = AuditState::Ongoing;
    h.store.save(&audit).await.unwrap();

    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(tick.launched, vec![audit.uuid]);
    tick.join().await;
    assert_eq!(state(&h, audit.uuid).await, AuditState::Succeeded);

    tokio::time::advance(Duration::from_secs(60)).await;
    h.handler.launch_audits_periodically().await.unwrap().join().await;
    assert_eq!(state(&h, audit.uuid).await, AuditState::Succeeded);

    let updates: Vec<_> = h
        .sink
        .received()
        .await
        .into_iter()
        .filter(|n| n.event_type == EventType::AuditUpdate)
        .map(|n| (n.payload.old_state, n.payload.state))
        .collect();
    assert_eq!(updates[0], (Some(AuditState::Ongoing), AuditState::Ongoing));
    assert_eq!(updates[1], (Some(AuditState::Ongoing), AuditState::Succeeded));
    assert_eq!(updates.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn missing_interval_uses_the_default() {
    let h = static_harness();
    let uuid = continuous(&h, None).await;

    h.handler.launch_audits_periodically().await.unwrap().join().await;

    tokio::time::advance(DEFAULT_INTERVAL - Duration::from_secs(1)).await;
    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert!(tick.launched.is_empty());

    tokio::time::advance(Duration::from_secs(1)).await;
    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(tick.launched, vec![uuid]);
    tick.join().await;
}

#[tokio::test(start_paused = true)]
async fn oneshot_and_cancelled_audits_are_never_scheduled() {
    let h = static_harness();
    let oneshot = h
        .engine
        .create_audit(Audit::new("once", AuditType::Oneshot, "dummy"))
        .await
        .unwrap();
    let cancelled = continuous(&h, Some(60)).await;
    h.engine.cancel_audit(cancelled).await.unwrap();

    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert!(tick.added.is_empty());
    assert!(tick.launched.is_empty());
    assert!(h.handler.scheduled().await.is_empty());
    assert_eq!(state(&h, oneshot.uuid).await, AuditState::Pending);
}

#[tokio::test(start_paused = true)]
async fn cancelled_audit_is_dropped_at_the_next_tick() {
    let h = static_harness();
    let uuid = continuous(&h, Some(60)).await;
    h.handler.launch_audits_periodically().await.unwrap().join().await;
    assert_eq!(h.handler.scheduled().await, vec![uuid]);

    h.engine.cancel_audit(uuid).await.unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;

    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(tick.removed, vec![uuid]);
    assert!(tick.launched.is_empty());
    assert!(h.handler.scheduled().await.is_empty());
    assert_eq!(state(&h, uuid).await, AuditState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn an_audit_never_overlaps_itself() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(Arc::new(GatedCollector { gate: gate.clone() }));
    let uuid = continuous(&h, Some(10)).await;

    let first = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(first.launched, vec![uuid]);

    tokio::time::advance(Duration::from_secs(10)).await;
    let second = h.handler.launch_audits_periodically().await.unwrap();
    assert!(second.launched.is_empty());
    assert_eq!(second.skipped, vec![uuid]);

    gate.add_permits(1);
    first.join().await;
    assert_eq!(state(&h, uuid).await, AuditState::Succeeded);

    tokio::time::advance(Duration::from_secs(10)).await;
    let third = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(third.launched, vec![uuid]);
    gate.add_permits(1);
    third.join().await;
}

#[tokio::test(start_paused = true)]
async fn distinct_audits_run_concurrently() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(Arc::new(GatedCollector { gate: gate.clone() }));
    let a = continuous(&h, Some(10)).await;
    let b = continuous(&h, Some(10)).await;

    let tick = h.handler.launch_audits_periodically().await.unwrap();
    assert_eq!(tick.launched.len(), 2);

    // both runs are parked in the collector at the same time
    settle().await;
    assert_eq!(state(&h, a).await, AuditState::Ongoing);
    assert_eq!(state(&h, b).await, AuditState::Ongoing);

    gate.add_permits(2);
    tick.join().await;
    assert_eq!(state(&h, a).await, AuditState::Succeeded);
    assert_eq!(state(&h, b).await, AuditState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_a_run_is_preserved() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(Arc::new(GatedCollector { gate: gate.clone() }));
    let uuid = continuous(&h, Some(10)).await;

    let tick = h.handler.launch_audits_periodically().await.unwrap();
    settle().await;
    assert_eq!(state(&h, uuid).await, AuditState::Ongoing);

    h.engine.cancel_audit(uuid).await.unwrap();
    gate.add_permits(1);
    tick.join().await;
    assert_eq!(state(&h, uuid).await, AuditState::Cancelled);
}

struct BrokenStore;

#[async_trait]
impl AuditStore for BrokenStore {
    async fn get_by_uuid(&self, uuid: Uuid) -> EngineResult<Audit> {
        Err(EngineError::AuditNotFound(uuid))
    }

    async fn list(&self) -> EngineResult<Vec<Audit>> {
        Err(EngineError::Store("database unavailable".into()))
    }

    async fn save(&self, _audit: &Audit) -> EngineResult<()> {
        Err(EngineError::Store("database unavailable".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn store_failures_skip_the_tick() {
    let engine = Arc::new(AuditEngine::new(
        Arc::new(BrokenStore),
        Arc::new(CollectorManager::new()),
        Arc::new(StrategyRegistry::default()),
        Arc::new(PlanOnlyApplier::default()),
        Notifier::default(),
    ));
    let handler = Arc::new(ContinuousAuditHandler::new(engine, DEFAULT_INTERVAL));
    assert!(matches!(
        handler.launch_audits_periodically().await,
        Err(EngineError::Store(_))
    ));

    // the loop keeps going through failing ticks until shut down
    let shutdown = tokio::time::sleep(Duration::from_secs(35));
    handler.clone().run(Duration::from_secs(10), shutdown).await;
    assert!(handler.scheduled().await.is_empty());
}
