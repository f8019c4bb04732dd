pub mod error;
pub mod event;
pub mod sink;
pub mod state;

pub use error::{PipelineError, Result};
pub use event::{tag, MetricEvent, MetricKind};
pub use sink::{DynSink, MetricSink, NullSink};
pub use state::{AggregatorState, StateCell};

// Re-export commonly used types
pub use async_trait::async_trait;
