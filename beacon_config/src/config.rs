use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub env: String,
    pub version: String,
    pub log: LogConfig,
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Settings for the buffered metrics pipeline.
///
/// Zero capacities and intervals are accepted here; the aggregator swaps
/// them for its own defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub buffer_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    pub max_batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Statsd(StatsdConfig),
    Log,
    Prometheus {
        #[serde(default)]
        namespace: Option<String>,
    },
    Memory,
}

impl SinkConfig {
    pub const KINDS: [&'static str; 4] = ["statsd", "log", "prometheus", "memory"];

    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Statsd(_) => "statsd",
            SinkConfig::Log => "log",
            SinkConfig::Prometheus { .. } => "prometheus",
            SinkConfig::Memory => "memory",
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Statsd(StatsdConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub max_payload_bytes: usize,
}

impl StatsdConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8125,
            namespace: "app.".to_string(),
            max_payload_bytes: 1432,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log: LogConfig::default(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8081".to_string(),
            request_timeout: Duration::from_secs(180),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_capacity: 1000,
            flush_interval: Duration::from_secs(1),
            max_batch_size: 500,
            sampling_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            sink: SinkConfig::default(),
        }
    }
}

/// Smallest datagram budget that still fits a realistic metric line.
const MIN_PAYLOAD_BYTES: usize = 64;

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.server
            .address
            .parse()
            .map_err(|e| format!("Invalid server address '{}': {}", self.server.address, e))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.env.trim().is_empty() {
            return Err("env cannot be empty".to_string());
        }

        if self.version.trim().is_empty() {
            return Err("version cannot be empty".to_string());
        }

        if self.server.address.trim().is_empty() {
            return Err("server address cannot be empty".to_string());
        }
        self.socket_addr()?;

        if self.server.request_timeout.is_zero() {
            return Err("server request_timeout must be > 0".to_string());
        }

        if self.metrics.shutdown_timeout.is_zero() {
            return Err("metrics shutdown_timeout must be > 0".to_string());
        }

        if let SinkConfig::Statsd(statsd) = &self.metrics.sink {
            if statsd.host.trim().is_empty() {
                return Err("statsd host cannot be empty".to_string());
            }

            if statsd.port == 0 {
                return Err("statsd port must be > 0".to_string());
            }

            if statsd.max_payload_bytes < MIN_PAYLOAD_BYTES {
                return Err(format!(
                    "statsd max_payload_bytes must be >= {}",
                    MIN_PAYLOAD_BYTES
                ));
            }
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.config.env = env.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log.level = level.into();
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log.format = format;
        self
    }

    pub fn server_address(mut self, address: impl Into<String>) -> Self {
        self.config.server.address = address.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.metrics.buffer_capacity = capacity;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.metrics.flush_interval = interval;
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.metrics.max_batch_size = size;
        self
    }

    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.config.metrics.sampling_interval = interval;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.metrics.shutdown_timeout = timeout;
        self
    }

    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.config.metrics.sink = sink;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.env, "dev");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.server.address, "0.0.0.0:8081");
        assert_eq!(config.server.request_timeout, Duration::from_secs(180));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.buffer_capacity, 1000);
        assert_eq!(config.metrics.flush_interval, Duration::from_secs(1));
        assert_eq!(config.metrics.max_batch_size, 500);
        assert_eq!(config.metrics.sampling_interval, Duration::from_secs(30));

        match &config.metrics.sink {
            SinkConfig::Statsd(statsd) => {
                assert_eq!(statsd.endpoint(), "localhost:8125");
                assert_eq!(statsd.namespace, "app.");
            }
            other => panic!("unexpected default sink: {:?}", other),
        }

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AppConfig::builder()
            .env("stg")
            .server_address("127.0.0.1:9000")
            .buffer_capacity(10)
            .max_batch_size(5)
            .flush_interval(Duration::from_millis(100))
            .sink(SinkConfig::Memory)
            .build();

        assert_eq!(config.env, "stg");
        assert_eq!(config.metrics.buffer_capacity, 10);
        assert_eq!(config.metrics.sink.kind(), "memory");
        assert_eq!(config.socket_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_validation() {
        assert!(AppConfig::builder().env("").build().validate().is_err());
        assert!(AppConfig::builder()
            .server_address(":8081")
            .build()
            .validate()
            .is_err());
        assert!(AppConfig::builder()
            .request_timeout(Duration::ZERO)
            .build()
            .validate()
            .is_err());
        assert!(AppConfig::builder()
            .shutdown_timeout(Duration::ZERO)
            .build()
            .validate()
            .is_err());

        let bad_port = SinkConfig::Statsd(StatsdConfig {
            port: 0,
            ..StatsdConfig::default()
        });
        assert!(AppConfig::builder().sink(bad_port).build().validate().is_err());

        let tiny_payload = SinkConfig::Statsd(StatsdConfig {
            max_payload_bytes: 16,
            ..StatsdConfig::default()
        });
        assert!(AppConfig::builder().sink(tiny_payload).build().validate().is_err());

        // zero pipeline sizes fall back to defaults later, so they are fine here
        assert!(AppConfig::builder()
            .buffer_capacity(0)
            .max_batch_size(0)
            .build()
            .validate()
            .is_ok());
    }
}
