use beacon_core::{tag, MetricEvent};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const REQUEST_COUNT: &str = "http.request.count";
pub const REQUEST_DURATION: &str = "http.request.duration";
pub const RESPONSE_SIZE: &str = "http.response.size";
pub const REQUEST_ERRORS: &str = "http.request.errors";

/// Events describing one finished HTTP request.
///
/// Every event carries `method`, `path` and `status` tags in that order. An
/// error count is added for any status of 400 or above.
pub fn http_request_events(
    method: &str,
    path: &str,
    status: u16,
    duration: Duration,
    response_size: u64,
) -> Vec<MetricEvent> {
    let tags = [tag("method", method), tag("path", path), tag("status", status)];

    let mut events = vec![
        MetricEvent::count(REQUEST_COUNT, 1.0).with_tags(tags.clone()),
        MetricEvent::gauge(REQUEST_DURATION, duration.as_millis() as f64).with_tags(tags.clone()),
        MetricEvent::histogram(RESPONSE_SIZE, response_size as f64).with_tags(tags.clone()),
    ];

    if status >= 400 {
        events.push(MetricEvent::count(REQUEST_ERRORS, 1.0).with_tags(tags));
    }

    events
}

/// Number of requests currently inside a handler.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    count: Arc<AtomicI64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn current(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<AtomicI64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::MetricKind;

    #[test]
    fn test_success_request_events() {
        let events = http_request_events("GET", "/api/v1/healthcheck", 200, Duration::from_millis(42), 27);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].name(), REQUEST_COUNT);
        assert_eq!(events[0].kind(), MetricKind::Count);
        assert_eq!(events[1].kind(), MetricKind::Gauge);
        assert_eq!(events[1].value(), 42.0);
        assert_eq!(events[2].kind(), MetricKind::Histogram);
        assert_eq!(events[2].value(), 27.0);

        for event in &events {
            assert_eq!(
                event.tags(),
                &["method:GET", "path:/api/v1/healthcheck", "status:200"]
            );
        }
    }

    #[test]
    fn test_error_request_adds_error_count() {
        let events = http_request_events("POST", "/api/v1/samples", 404, Duration::ZERO, 0);

        assert_eq!(events.len(), 4);
        assert_eq!(events[3].name(), REQUEST_ERRORS);
        assert_eq!(events[3].tags()[2], "status:404");
    }

    #[test]
    fn test_in_flight_guard() {
        let tracker = InFlightTracker::new();
        let first = tracker.enter();
        let second = tracker.clone().enter();
        assert_eq!(tracker.current(), 2);

        drop(first);
        assert_eq!(tracker.current(), 1);
        drop(second);
        assert_eq!(tracker.current(), 0);
    }
}
