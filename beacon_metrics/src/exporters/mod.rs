pub mod log;
pub mod prometheus;
pub mod statsd;

pub use self::log::LogSink;
pub use self::prometheus::{render_registry, PrometheusSink};
pub use self::statsd::StatsdSink;

use crate::collector::MetricsCollector;
use beacon_config::SinkConfig;
use beacon_core::{tag, DynSink};

/// A sink ready to hand to the aggregator, plus the registry to scrape when
/// the sink is Prometheus.
pub struct BuiltSink {
    pub sink: DynSink,
    pub registry: Option<::prometheus::Registry>,
}

/// Builds the sink described by `config`. Nothing is connected yet.
pub fn build_sink(config: &SinkConfig, env: &str, version: &str) -> BuiltSink {
    match config {
        SinkConfig::Statsd(statsd) => BuiltSink {
            sink: Box::new(
                StatsdSink::new(statsd)
                    .with_constant_tags([tag("env", env), tag("version", version)]),
            ),
            registry: None,
        },
        SinkConfig::Log => BuiltSink {
            sink: Box::new(LogSink::new()),
            registry: None,
        },
        SinkConfig::Prometheus { namespace } => {
            let sink = PrometheusSink::new(namespace.clone());
            let registry = sink.registry();
            BuiltSink {
                sink: Box::new(sink),
                registry: Some(registry),
            }
        }
        SinkConfig::Memory => BuiltSink {
            sink: Box::new(MetricsCollector::new()),
            registry: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_config::StatsdConfig;

    #[test]
    fn test_build_each_sink() {
        let statsd = build_sink(&SinkConfig::Statsd(StatsdConfig::default()), "dev", "1.0");
        assert_eq!(statsd.sink.name(), "statsd");
        assert!(statsd.registry.is_none());

        assert_eq!(build_sink(&SinkConfig::Log, "dev", "1.0").sink.name(), "log");
        assert_eq!(build_sink(&SinkConfig::Memory, "dev", "1.0").sink.name(), "memory");

        let prometheus = build_sink(&SinkConfig::Prometheus { namespace: None }, "dev", "1.0");
        assert_eq!(prometheus.sink.name(), "prometheus");
        assert!(prometheus.registry.is_some());
    }
}
