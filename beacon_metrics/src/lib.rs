pub mod aggregator;
pub mod collector;
pub mod exporters;
pub mod http;
pub mod sampler;
pub mod stats;

pub use aggregator::{AggregatorConfig, MetricsAggregator, ShutdownOutcome};
pub use collector::{MetricsCollector, RecordedBatch};
pub use exporters::{build_sink, render_registry, BuiltSink, LogSink, PrometheusSink, StatsdSink};
pub use http::{http_request_events, InFlightGuard, InFlightTracker};
pub use sampler::SystemSampler;
pub use stats::{PipelineStats, StatsSnapshot};
