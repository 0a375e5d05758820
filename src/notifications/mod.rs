//! Audit notifications.
//!
//! The engine emits one notification per audit state change and around every
//! strategy run. Sinks are best effort: a failing sink is logged and never
//! fails the audit.

pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{Audit, AuditState, AuditType};

pub use webhook::WebhookSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "audit.update")]
    AuditUpdate,
    #[serde(rename = "audit.strategy.start")]
    StrategyStart,
    #[serde(rename = "audit.strategy.end")]
    StrategyEnd,
    #[serde(rename = "audit.strategy.error")]
    StrategyError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AuditUpdate => "audit.update",
            EventType::StrategyStart => "audit.strategy.start",
            EventType::StrategyEnd => "audit.strategy.end",
            EventType::StrategyError => "audit.strategy.error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    pub audit_uuid: Uuid,
    pub audit_name: String,
    pub audit_type: AuditType,
    pub state: AuditState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_state: Option<AuditState>,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditNotification {
    pub event_type: EventType,
    pub priority: Priority,
    pub publisher_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: AuditPayload,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, notification: &AuditNotification) -> Result<()>;
}

/// Writes every notification to the tracing log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn emit(&self, n: &AuditNotification) -> Result<()> {
        let p = &n.payload;
        match n.priority {
            Priority::Info => info!(
                event = n.event_type.as_str(),
                audit = %p.audit_uuid,
                state = %p.state,
                old_state = ?p.old_state,
                "audit notification"
            ),
            Priority::Error => error!(
                event = n.event_type.as_str(),
                audit = %p.audit_uuid,
                fault = p.fault.as_deref().unwrap_or_default(),
                "audit notification"
            ),
        }
        Ok(())
    }
}

/// Keeps notifications in memory, for tests and the one-shot CLI.
#[derive(Default)]
pub struct MemorySink {
    received: RwLock<Vec<AuditNotification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn received(&self) -> Vec<AuditNotification> {
        self.received.read().await.clone()
    }

    pub async fn events(&self) -> Vec<EventType> {
        self.received
            .read()
            .await
            .iter()
            .map(|n| n.event_type)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn emit(&self, notification: &AuditNotification) -> Result<()> {
        self.received.write().await.push(notification.clone());
        Ok(())
    }
}

/// Fans notifications out to every configured sink.
#[derive(Clone)]
pub struct Notifier {
    publisher_id: String,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Notifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self {
            publisher_id: format!("steward-engine.{}", gethostname()),
            sinks,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub async fn audit_update(&self, audit: &Audit, old_state: AuditState) {
        self.send(audit, EventType::AuditUpdate, Priority::Info, Some(old_state), None)
            .await;
    }

    pub async fn strategy_start(&self, audit: &Audit, strategy: &str) {
        self.send_for(audit, strategy, EventType::StrategyStart, Priority::Info, None)
            .await;
    }

    pub async fn strategy_end(&self, audit: &Audit, strategy: &str) {
        self.send_for(audit, strategy, EventType::StrategyEnd, Priority::Info, None)
            .await;
    }

    pub async fn strategy_error(&self, audit: &Audit, strategy: &str, fault: &str) {
        self.send_for(
            audit,
            strategy,
            EventType::StrategyError,
            Priority::Error,
            Some(fault.to_string()),
        )
        .await;
    }

    async fn send_for(
        &self,
        audit: &Audit,
        strategy: &str,
        event_type: EventType,
        priority: Priority,
        fault: Option<String>,
    ) {
        let mut notification = self.build(audit, event_type, priority, None, fault);
        notification.payload.strategy = Some(strategy.to_string());
        self.dispatch(&notification).await;
    }

    async fn send(
        &self,
        audit: &Audit,
        event_type: EventType,
        priority: Priority,
        old_state: Option<AuditState>,
        fault: Option<String>,
    ) {
        let notification = self.build(audit, event_type, priority, old_state, fault);
        self.dispatch(&notification).await;
    }

    fn build(
        &self,
        audit: &Audit,
        event_type: EventType,
        priority: Priority,
        old_state: Option<AuditState>,
        fault: Option<String>,
    ) -> AuditNotification {
        AuditNotification {
            event_type,
            priority,
            publisher_id: self.publisher_id.clone(),
            timestamp: Utc::now(),
            payload: AuditPayload {
                audit_uuid: audit.uuid,
                audit_name: audit.name.clone(),
                audit_type: audit.audit_type,
                state: audit.state,
                old_state,
                goal: audit.goal.clone(),
                strategy: audit.strategy.clone(),
                fault,
            },
        }
    }

    async fn dispatch(&self, notification: &AuditNotification) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(notification).await {
                warn!(
                    event = notification.event_type.as_str(),
                    audit = %notification.payload.audit_uuid,
                    error = %e,
                    "failed to emit notification"
                );
            }
        }
    }
}

fn gethostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn emit(&self, _n: &AuditNotification) -> Result<()> {
            anyhow::bail!("sink is down")
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_stop_the_others() {
        let memory = Arc::new(MemorySink::new());
        let notifier = Notifier::default()
            .with_sink(Arc::new(FailingSink))
            .with_sink(memory.clone());
        let audit = Audit::new("a", AuditType::Oneshot, "dummy");

        notifier.audit_update(&audit, AuditState::Pending).await;
        notifier.strategy_error(&audit, "dummy", "boom").await;

        let received = memory.received().await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].payload.old_state, Some(AuditState::Pending));
        assert_eq!(received[1].priority, Priority::Error);
        assert_eq!(received[1].payload.fault.as_deref(), Some("boom"));
        assert_eq!(received[1].payload.strategy.as_deref(), Some("dummy"));
        assert!(received[0].publisher_id.starts_with("steward-engine."));
    }

    #[test]
    fn event_types_serialize_dotted() {
        let json = serde_json::to_value(EventType::StrategyEnd).unwrap();
        assert_eq!(json, "audit.strategy.end");
        assert_eq!(EventType::AuditUpdate.as_str(), "audit.update");
    }
}
