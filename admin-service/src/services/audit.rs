use async_trait::async_trait;
use std::sync::Mutex;

use crate::models::{AuditEvent, AuditEventType};

/// Append-only sink for operational events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error>;
}

/// Keeps events in memory; used by tests and local runs.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_of(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.is(event_type))
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        tracing::debug!(event_type = %event.event_type_code, "Audit event recorded");
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("audit sink lock poisoned"))?
            .push(event);
        Ok(())
    }
}
