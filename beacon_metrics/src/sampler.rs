use crate::aggregator::Producer;
use crate::http::InFlightTracker;
use beacon_core::MetricEvent;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const INFLIGHT_REQUESTS: &str = "system.inflight_requests";
pub const MEMORY_RSS: &str = "system.memory.rss";
pub const MEMORY_VIRTUAL: &str = "system.memory.virtual";
pub const MEMORY_USED: &str = "system.memory.used";

/// Reads process and host gauges on demand.
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
    in_flight: InFlightTracker,
}

impl SystemSampler {
    pub fn new(in_flight: InFlightTracker) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(error = e, "process memory sampling unavailable");
                None
            }
        };

        Self {
            system: System::new(),
            pid,
            in_flight,
        }
    }

    /// One reading of every gauge. Memory values are in bytes.
    pub fn sample(&mut self) -> Vec<MetricEvent> {
        let mut events = vec![MetricEvent::gauge(
            INFLIGHT_REQUESTS,
            self.in_flight.current() as f64,
        )];

        if let Some(pid) = self.pid {
            if self.system.refresh_process(pid) {
                if let Some(process) = self.system.process(pid) {
                    events.push(
                        MetricEvent::gauge(MEMORY_RSS, process.memory() as f64)
                            .with_tag("type", "rss"),
                    );
                    events.push(
                        MetricEvent::gauge(MEMORY_VIRTUAL, process.virtual_memory() as f64)
                            .with_tag("type", "virtual"),
                    );
                }
            }
        }

        self.system.refresh_memory();
        events.push(
            MetricEvent::gauge(MEMORY_USED, self.system.used_memory() as f64)
                .with_tag("type", "host"),
        );

        events
    }
}

/// Samples every `period` until `shutdown` fires. The first reading is taken
/// one period after start.
pub(crate) async fn run(
    mut sampler: SystemSampler,
    producer: Arc<Producer>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for event in sampler.sample() {
                    producer.record(event);
                }
            }
        }
    }

    info!("System metrics sampling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reports_in_flight_and_memory() {
        let tracker = InFlightTracker::new();
        let _a = tracker.enter();
        let _b = tracker.enter();

        let mut sampler = SystemSampler::new(tracker);
        let events = sampler.sample();

        assert_eq!(events[0].name(), INFLIGHT_REQUESTS);
        assert_eq!(events[0].value(), 2.0);

        let host = events.last().unwrap();
        assert_eq!(host.name(), MEMORY_USED);
        assert_eq!(host.tags(), &["type:host"]);
        assert!(host.value() > 0.0);
    }

    #[test]
    fn test_process_memory_tags() {
        let mut sampler = SystemSampler::new(InFlightTracker::new());
        let events = sampler.sample();

        if let Some(rss) = events.iter().find(|e| e.name() == MEMORY_RSS) {
            assert_eq!(rss.tags(), &["type:rss"]);
            let virt = events.iter().find(|e| e.name() == MEMORY_VIRTUAL).unwrap();
            assert_eq!(virt.tags(), &["type:virtual"]);
        }
    }
}
