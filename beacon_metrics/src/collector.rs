use beacon_core::{async_trait, MetricEvent, MetricSink, PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

#[derive(Debug, Clone, Serialize)]
pub struct RecordedBatch {
    pub received_at: DateTime<Utc>,
    pub events: Vec<MetricEvent>,
}

/// In-memory sink that keeps every batch it receives.
///
/// Clones share the same storage, so a test can hand one clone to the
/// aggregator and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    batches: Arc<RwLock<Vec<RecordedBatch>>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    unreachable: bool,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector whose `connect` always fails.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub async fn batches(&self) -> Vec<RecordedBatch> {
        self.batches.read().await.clone()
    }

    /// All received events, flattened in emit order.
    pub async fn events(&self) -> Vec<MetricEvent> {
        self.batches
            .read()
            .await
            .iter()
            .flat_map(|batch| batch.events.iter().cloned())
            .collect()
    }

    pub async fn batch_count(&self) -> usize {
        self.batches.read().await.len()
    }

    /// Waits until at least `count` batches have arrived. Returns `false` if
    /// `timeout` passes first.
    pub async fn wait_for_batches(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            if self.batch_count().await >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.batch_count().await >= count;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn clear(&self) {
        self.batches.write().await.clear();
    }
}

#[async_trait]
impl MetricSink for MetricsCollector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.unreachable {
            return Err(PipelineError::SinkUnavailable(
                "memory collector is marked unreachable".to_string(),
            ));
        }
        Ok(())
    }

    async fn emit_batch(&mut self, events: &[MetricEvent]) -> Result<()> {
        self.batches.write().await.push(RecordedBatch {
            received_at: Utc::now(),
            events: events.to_vec(),
        });
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
