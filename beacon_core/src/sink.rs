use crate::{error::Result, event::MetricEvent};
use async_trait::async_trait;

/// Downstream destination for flushed metric batches.
///
/// A sink is owned by exactly one flush worker, so `emit_batch` is never
/// called concurrently with itself. Implementations only need to be `Send`.
#[async_trait]
pub trait MetricSink: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Establish the connection to the backend. Called once, before any
    /// background work starts; an error here aborts pipeline construction.
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Deliver one batch, in order.
    async fn emit_batch(&mut self, events: &[MetricEvent]) -> Result<()>;

    /// Release the backend connection after the final flush.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type DynSink = Box<dyn MetricSink>;

/// Sink that accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl MetricSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn emit_batch(&mut self, _events: &[MetricEvent]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_sink_delegates() {
        let mut sink: DynSink = Box::new(NullSink);
        assert_eq!(sink.name(), "null");

        tokio_test::block_on(async {
            tokio_test::assert_ok!(sink.connect().await);
            tokio_test::assert_ok!(sink.emit_batch(&[MetricEvent::count("hits", 1.0)]).await);
            tokio_test::assert_ok!(sink.close().await);
        });
    }
}
