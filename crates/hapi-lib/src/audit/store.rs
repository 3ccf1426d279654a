//! Fire-and-forget audit buffering
//!
//! Request handlers enqueue events through [`AuditStore::store_audit`], which
//! never waits: a full buffer drops the event. A single [`AuditWorker`] drains
//! the buffer in the background and writes batches through an [`AuditWriter`].

use super::events::AuditEvent;
use crate::health::{components, HealthRegistry};
use crate::observability::HapiMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for audit buffering and flushing
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Bounded buffer capacity; events beyond it are dropped
    pub buffer_size: usize,
    /// Flush as soon as this many events are pending
    pub batch_size: usize,
    /// Flush a partial batch after this long
    pub flush_interval: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10_000,
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
            retry_delay: Duration::from_millis(500),
            max_retries: 3,
        }
    }
}

/// Destination for audit batches
#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn write_batch(&self, events: &[AuditEvent]) -> anyhow::Result<()>;
}

/// Producer handle for audit events, cheap to clone across requests
#[derive(Clone)]
pub struct AuditStore {
    sender: mpsc::Sender<AuditEvent>,
    metrics: HapiMetrics,
}

impl AuditStore {
    /// Create the store and the receiver its worker drains
    pub fn new(config: &AuditConfig) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(config.buffer_size.max(1));
        let store = Self {
            sender,
            metrics: HapiMetrics::new(),
        };
        (store, receiver)
    }

    /// Enqueue an event without blocking; returns whether it was accepted
    pub fn store_audit(&self, event: AuditEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.metrics.inc_audit_enqueued();
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.inc_audit_dropped(1);
                warn!(
                    event = "audit_dropped",
                    event_type = event.event_type.as_str(),
                    incident_id = %event.incident_id,
                    "Audit buffer full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.metrics.inc_audit_dropped(1);
                debug!(
                    event_type = event.event_type.as_str(),
                    "Audit worker stopped, dropping event"
                );
                false
            }
        }
    }
}

/// Background batching flusher
pub struct AuditWorker {
    config: AuditConfig,
    receiver: mpsc::Receiver<AuditEvent>,
    writer: Arc<dyn AuditWriter>,
    pending: Vec<AuditEvent>,
    metrics: HapiMetrics,
    health: Option<HealthRegistry>,
}

impl AuditWorker {
    pub fn new(
        config: AuditConfig,
        receiver: mpsc::Receiver<AuditEvent>,
        writer: Arc<dyn AuditWriter>,
    ) -> Self {
        let capacity = config.batch_size;
        Self {
            config,
            receiver,
            writer,
            pending: Vec::with_capacity(capacity),
            metrics: HapiMetrics::new(),
            health: None,
        }
    }

    /// Report write failures to the health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Drain the buffer until every `AuditStore` handle is dropped
    pub async fn run(mut self) {
        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "Starting audit worker"
        );

        let mut ticker =
            tokio::time::interval(self.config.flush_interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Some(event) => {
                        self.pending.push(event);
                        if self.pending.len() >= self.config.batch_size {
                            self.flush().await;
                        }
                    }
                    None => {
                        self.flush().await;
                        info!("Audit channel closed, worker stopped");
                        return;
                    }
                },

                _ = ticker.tick() => {
                    if !self.pending.is_empty() {
                        debug!(pending = self.pending.len(), "Flushing partial audit batch");
                        self.flush().await;
                    }
                }
            }
        }
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len() as u64;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.writer.write_batch(&batch).await {
                Ok(()) => {
                    debug!(events = count, "Audit batch written");
                    self.metrics.inc_audit_flushed(count);
                    if let Some(health) = &self.health {
                        health.set_healthy(components::AUDIT).await;
                    }
                    return;
                }
                Err(e) if attempt >= self.config.max_retries => {
                    error!(
                        error = %e,
                        attempts = attempt,
                        events = count,
                        "Failed to write audit batch, dropping events"
                    );
                    self.metrics.inc_audit_dropped(count);
                    if let Some(health) = &self.health {
                        health
                            .set_degraded(components::AUDIT, format!("audit writes failing: {}", e))
                            .await;
                    }
                    return;
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt, "Audit batch write failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}
