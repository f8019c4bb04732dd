use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three measurement kinds a sink understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Count,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Count, MetricKind::Gauge, MetricKind::Histogram];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Count => "count",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }

    /// DogStatsD type code.
    pub fn statsd_code(&self) -> &'static str {
        match self {
            MetricKind::Count => "c",
            MetricKind::Gauge => "g",
            MetricKind::Histogram => "h",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(MetricKind::Count),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            _ => Err(PipelineError::UnknownKind(s.to_string())),
        }
    }
}

/// A single measurement on its way to a sink.
///
/// Events are built once by a producer and then only read. Tags are
/// `key:value` strings and reach the sink in the order they were given.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricEvent {
    kind: MetricKind,
    name: String,
    value: f64,
    tags: Vec<String>,
    sample_rate: f64,
}

impl MetricEvent {
    pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

    pub fn new(
        kind: MetricKind,
        name: impl Into<String>,
        value: f64,
        tags: Vec<String>,
        sample_rate: f64,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::InvalidEvent(
                "metric name cannot be empty".to_string(),
            ));
        }
        validate_sample_rate(sample_rate)?;

        Ok(Self {
            kind,
            name,
            value,
            tags,
            sample_rate,
        })
    }

    pub fn count(name: impl Into<String>, value: f64) -> Self {
        Self::unchecked(MetricKind::Count, name.into(), value)
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::unchecked(MetricKind::Gauge, name.into(), value)
    }

    pub fn histogram(name: impl Into<String>, value: f64) -> Self {
        Self::unchecked(MetricKind::Histogram, name.into(), value)
    }

    fn unchecked(kind: MetricKind, name: String, value: f64) -> Self {
        Self {
            kind,
            name,
            value,
            tags: Vec::new(),
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_tag(self, key: &str, value: impl fmt::Display) -> Self {
        self.with_tags([tag(key, value)])
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Result<Self> {
        validate_sample_rate(sample_rate)?;
        self.sample_rate = sample_rate;
        Ok(self)
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

/// Formats a `key:value` tag.
pub fn tag(key: &str, value: impl fmt::Display) -> String {
    format!("{}:{}", key, value)
}

fn validate_sample_rate(rate: f64) -> Result<()> {
    if rate > 0.0 && rate <= 1.0 {
        Ok(())
    } else {
        Err(PipelineError::InvalidSampleRate(rate))
    }
}
