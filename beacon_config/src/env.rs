use crate::config::{AppConfig, LogFormat, SinkConfig};
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "BEACON_";

/// Applies `BEACON_*` overrides on top of `config`.
///
/// Unknown `BEACON_*` keys are ignored; malformed values are errors.
pub fn apply_env_overrides<I, K, V>(config: &mut AppConfig, vars: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    for (key, value) in vars {
        let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let value: String = value.into();
        let key = key.as_ref();

        match name {
            "ENV" => config.env = value,
            "VERSION" => config.version = value,
            "LOG_LEVEL" => config.log.level = value,
            "LOG_FORMAT" => config.log.format = parse_log_format(key, &value)?,
            "SERVER_ADDRESS" => config.server.address = value,
            "REQUEST_TIMEOUT" => config.server.request_timeout = parse_duration(key, &value)?,
            "METRICS_ENABLED" => config.metrics.enabled = parse_value(key, &value)?,
            "BUFFER_CAPACITY" => config.metrics.buffer_capacity = parse_value(key, &value)?,
            "FLUSH_INTERVAL" => config.metrics.flush_interval = parse_duration(key, &value)?,
            "MAX_BATCH_SIZE" => config.metrics.max_batch_size = parse_value(key, &value)?,
            "SAMPLING_INTERVAL" => {
                config.metrics.sampling_interval = parse_duration(key, &value)?
            }
            "SHUTDOWN_TIMEOUT" => config.metrics.shutdown_timeout = parse_duration(key, &value)?,
            "STATSD_HOST" | "STATSD_PORT" => match &mut config.metrics.sink {
                SinkConfig::Statsd(statsd) if name == "STATSD_HOST" => statsd.host = value,
                SinkConfig::Statsd(statsd) => statsd.port = parse_value(key, &value)?,
                other => debug!(key, sink = other.kind(), "ignoring statsd override"),
            },
            _ => debug!(key, "ignoring unknown override"),
        }
    }

    Ok(())
}

/// Keeps the `BEACON_*` entries of a process environment as UTF-8 pairs.
///
/// Keys that are not UTF-8 cannot carry the prefix and are skipped. A
/// `BEACON_*` key with a non-UTF-8 value is an error.
pub fn prefixed_env_vars<I>(vars: I) -> Result<Vec<(String, String)>>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut prefixed = Vec::new();

    for (key, value) in vars {
        let Ok(key) = key.into_string() else {
            continue;
        };
        if !key.starts_with(ENV_PREFIX) {
            continue;
        }
        let value = value
            .into_string()
            .map_err(|_| anyhow::anyhow!("value of {} is not valid UTF-8", key))?;
        prefixed.push((key, value));
    }

    Ok(prefixed)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{}' for {}", value, key))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("invalid duration '{}' for {}", value, key))
}

fn parse_log_format(key: &str, value: &str) -> Result<LogFormat> {
    match value.trim().to_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "text" => Ok(LogFormat::Text),
        _ => Err(anyhow::anyhow!("invalid log format '{}' for {}", value, key)),
    }
}
