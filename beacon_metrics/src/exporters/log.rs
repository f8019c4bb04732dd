use beacon_core::{async_trait, MetricEvent, MetricSink, Result};
use tracing::info;

/// Writes every event to the application log. Useful when no agent is
/// running.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn emit_batch(&mut self, events: &[MetricEvent]) -> Result<()> {
        for event in events {
            info!(
                target: "beacon::metrics",
                kind = %event.kind(),
                name = event.name(),
                value = event.value(),
                sample_rate = event.sample_rate(),
                tags = ?event.tags(),
                "metric"
            );
        }
        Ok(())
    }
}
