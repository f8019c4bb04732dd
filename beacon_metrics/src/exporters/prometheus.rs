use beacon_core::{async_trait, MetricEvent, MetricKind, MetricSink, PipelineError, Result};
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::warn;

enum Collector {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

struct Family {
    kind: MetricKind,
    labels: Vec<String>,
    collector: Collector,
}

impl Family {
    fn register(registry: &Registry, name: &str, kind: MetricKind, labels: Vec<String>) -> Result<Self> {
        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let help = format!("{} {}", kind, name);

        let collector = match kind {
            MetricKind::Count => {
                let vec = CounterVec::new(Opts::new(name, help), &label_refs).map_err(emit_error)?;
                registry.register(Box::new(vec.clone())).map_err(emit_error)?;
                Collector::Counter(vec)
            }
            MetricKind::Gauge => {
                let vec = GaugeVec::new(Opts::new(name, help), &label_refs).map_err(emit_error)?;
                registry.register(Box::new(vec.clone())).map_err(emit_error)?;
                Collector::Gauge(vec)
            }
            MetricKind::Histogram => {
                let vec = HistogramVec::new(HistogramOpts::new(name, help), &label_refs)
                    .map_err(emit_error)?;
                registry.register(Box::new(vec.clone())).map_err(emit_error)?;
                Collector::Histogram(vec)
            }
        };

        Ok(Self {
            kind,
            labels,
            collector,
        })
    }
}

fn emit_error(e: prometheus::Error) -> PipelineError {
    PipelineError::Emit(e.to_string())
}

/// Folds events into a Prometheus registry for scraping.
///
/// Event names become metric names with `.` and `-` turned into `_`; tags of
/// the form `key:value` become labels. Counts are scaled up by their sample
/// rate. The first event seen for a name fixes its kind and label keys, and
/// later events that disagree are rejected.
pub struct PrometheusSink {
    registry: Registry,
    namespace: Option<String>,
    families: HashMap<String, Family>,
}

impl PrometheusSink {
    pub fn new(namespace: Option<String>) -> Self {
        Self::with_registry(Registry::new(), namespace)
    }

    pub fn with_registry(registry: Registry, namespace: Option<String>) -> Self {
        Self {
            registry,
            namespace,
            families: HashMap::new(),
        }
    }

    /// Handle to the underlying registry; clones share state.
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn render(&self) -> Result<String> {
        render_registry(&self.registry)
    }

    fn apply(&mut self, event: &MetricEvent) -> Result<()> {
        let name = metric_name(self.namespace.as_deref(), event.name());
        let (keys, values) = split_tags(event.tags());

        let family = match self.families.entry(name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let family = Family::register(&self.registry, entry.key(), event.kind(), keys.clone())?;
                entry.insert(family)
            }
        };

        if family.kind != event.kind() {
            return Err(PipelineError::Emit(format!(
                "{} is a {}, got a {}",
                event.name(),
                family.kind,
                event.kind()
            )));
        }
        if family.labels != keys {
            return Err(PipelineError::Emit(format!(
                "{} expects labels {:?}, got {:?}",
                event.name(),
                family.labels,
                keys
            )));
        }

        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        match &family.collector {
            Collector::Counter(vec) => {
                let amount = event.value() / event.sample_rate();
                if !amount.is_finite() || amount < 0.0 {
                    return Err(PipelineError::Emit(format!(
                        "{} cannot decrease a counter by {}",
                        event.name(),
                        event.value()
                    )));
                }
                vec.with_label_values(&values).inc_by(amount);
            }
            Collector::Gauge(vec) => vec.with_label_values(&values).set(event.value()),
            Collector::Histogram(vec) => vec.with_label_values(&values).observe(event.value()),
        }

        Ok(())
    }
}

#[async_trait]
impl MetricSink for PrometheusSink {
    fn name(&self) -> &str {
        "prometheus"
    }

    /// Rejected events are logged and skipped; the rest of the batch still
    /// lands in the registry.
    async fn emit_batch(&mut self, events: &[MetricEvent]) -> Result<()> {
        for event in events {
            if let Err(e) = self.apply(event) {
                warn!(name = event.name(), error = %e, "Rejected metric");
            }
        }
        Ok(())
    }
}

/// Text exposition of everything in `registry`.
pub fn render_registry(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(emit_error)?;
    String::from_utf8(buffer).map_err(|e| PipelineError::Emit(e.to_string()))
}

fn metric_name(namespace: Option<&str>, name: &str) -> String {
    let full = match namespace.map(|ns| ns.trim_end_matches(['.', '_'])) {
        Some(ns) if !ns.is_empty() => format!("{}_{}", ns, name),
        _ => name.to_string(),
    };
    sanitize(&full, true)
}

fn sanitize(raw: &str, allow_colon: bool) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.starts_with(|c: char| c.is_ascii_digit()) || out.is_empty() {
        out.insert(0, '_');
    }
    out
}

fn split_tags(tags: &[String]) -> (Vec<String>, Vec<String>) {
    tags.iter()
        .map(|tag| match tag.split_once(':') {
            Some((key, value)) => (sanitize(key, false), value.to_string()),
            None => (sanitize(tag, false), String::new()),
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn emit(sink: &mut PrometheusSink, events: Vec<MetricEvent>) {
        sink.emit_batch(&events).await.unwrap();
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(metric_name(None, "http.request.count"), "http_request_count");
        assert_eq!(metric_name(Some("app."), "system.memory-rss"), "app_system_memory_rss");
        assert_eq!(metric_name(Some(""), "9lives"), "_9lives");
    }

    #[tokio::test]
    async fn test_counters_scale_by_sample_rate() {
        let mut sink = PrometheusSink::new(None);
        emit(
            &mut sink,
            vec![
                MetricEvent::count("jobs.done", 1.0).with_tag("queue", "fast"),
                MetricEvent::count("jobs.done", 1.0)
                    .with_tag("queue", "fast")
                    .with_sample_rate(0.5)
                    .unwrap(),
            ],
        )
        .await;

        let text = sink.render().unwrap();
        assert!(text.contains("# TYPE jobs_done counter"));
        assert!(text.contains("jobs_done{queue=\"fast\"} 3"));
    }

    #[tokio::test]
    async fn test_gauges_and_histograms() {
        let mut sink = PrometheusSink::new(Some("beacon".to_string()));
        emit(
            &mut sink,
            vec![
                MetricEvent::gauge("inflight", 3.0),
                MetricEvent::gauge("inflight", 5.0),
                MetricEvent::histogram("response.size", 0.2),
            ],
        )
        .await;

        let text = sink.render().unwrap();
        assert!(text.contains("beacon_inflight 5"));
        assert!(text.contains("# TYPE beacon_response_size histogram"));
        assert!(text.contains("beacon_response_size_count 1"));
    }

    #[tokio::test]
    async fn test_conflicting_events_are_rejected() {
        let mut sink = PrometheusSink::new(None);
        emit(&mut sink, vec![MetricEvent::count("hits", 1.0).with_tag("a", 1)]).await;

        assert!(sink.apply(&MetricEvent::gauge("hits", 1.0).with_tag("a", 1)).is_err());
        assert!(sink.apply(&MetricEvent::count("hits", 1.0).with_tag("b", 1)).is_err());
        assert!(sink.apply(&MetricEvent::count("hits", -1.0).with_tag("a", 1)).is_err());

        // rest of the batch still applies
        emit(
            &mut sink,
            vec![
                MetricEvent::gauge("hits", 9.0),
                MetricEvent::count("hits", 2.0).with_tag("a", 1),
            ],
        )
        .await;
        assert!(sink.render().unwrap().contains("hits{a=\"1\"} 3"));
    }

    #[test]
    fn test_shared_registry() {
        let sink = PrometheusSink::new(None);
        let registry = sink.registry();
        let mut sink = sink;
        tokio_test::block_on(sink.emit_batch(&[MetricEvent::gauge("up", 1.0)])).unwrap();

        assert!(render_registry(&registry).unwrap().contains("up 1"));
    }
}
