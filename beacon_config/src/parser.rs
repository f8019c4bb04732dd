use crate::config::AppConfig;
use crate::env::{apply_env_overrides, prefixed_env_vars};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

pub async fn parse_config_from_file(path: impl AsRef<Path>) -> Result<AppConfig> {
    let config = read_config_file(path.as_ref()).await?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config_from_str(content: &str, format: &str) -> Result<AppConfig> {
    let config = match format.to_lowercase().as_str() {
        "yaml" | "yml" => parse_yaml(content)?,
        "toml" => parse_toml(content)?,
        "json" => parse_json(content)?,
        _ => return Err(anyhow::anyhow!("Unsupported format: {}", format)),
    };
    validate(&config)?;
    Ok(config)
}

/// Defaults, then the optional file, then `BEACON_*` environment variables.
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    load_config_with(path, prefixed_env_vars(std::env::vars_os())?).await
}

/// Same as [`load_config`] with explicit override variables. The result is
/// validated once, after the overrides are applied.
pub async fn load_config_with<I, K, V>(path: Option<&Path>, vars: I) -> Result<AppConfig>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut config = match path {
        Some(path) => read_config_file(path).await?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, vars)?;
    validate(&config)?;

    debug!(env = %config.env, sink = config.metrics.sink.kind(), "configuration loaded");
    Ok(config)
}

async fn read_config_file(path: &Path) -> Result<AppConfig> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let extension = path.extension().and_then(|s| s.to_str());

    match extension {
        Some("yaml") | Some("yml") => parse_yaml(&contents),
        Some("toml") => parse_toml(&contents),
        Some("json") => parse_json(&contents),
        _ => Err(anyhow::anyhow!(
            "Unsupported file format. Use .yaml, .yml, .toml, or .json"
        )),
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|e| anyhow::anyhow!(e))
}

fn parse_yaml(content: &str) -> Result<AppConfig> {
    Ok(serde_yaml::from_str(content)?)
}

fn parse_toml(content: &str) -> Result<AppConfig> {
    Ok(toml::from_str(content)?)
}

fn parse_json(content: &str) -> Result<AppConfig> {
    Ok(serde_json::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, SinkConfig};
    use std::time::Duration;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
env: "prd"
log:
  level: "warn"
  format: "text"
metrics:
  buffer_capacity: 2000
  flush_interval: 250ms
  sink:
    type: statsd
    host: "dd-agent"
    port: 8125
"#;

        let config = parse_yaml(yaml).unwrap();
        assert_eq!(config.env, "prd");
        assert_eq!(config.log.format, LogFormat::Text);
        assert_eq!(config.metrics.buffer_capacity, 2000);
        assert_eq!(config.metrics.flush_interval, Duration::from_millis(250));
        // untouched fields keep their defaults
        assert_eq!(config.metrics.max_batch_size, 500);

        match config.metrics.sink {
            SinkConfig::Statsd(statsd) => {
                assert_eq!(statsd.host, "dd-agent");
                assert_eq!(statsd.namespace, "app.");
            }
            other => panic!("unexpected sink: {:?}", other),
        }
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
env = "stg"

[server]
address = "127.0.0.1:8090"
request_timeout = "30s"

[metrics]
shutdown_timeout = "2s"

[metrics.sink]
type = "prometheus"
namespace = "beacon"
"#;

        let config = parse_toml(toml).unwrap();
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.metrics.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(
            config.metrics.sink,
            SinkConfig::Prometheus {
                namespace: Some("beacon".to_string())
            }
        );
    }

    #[test]
    fn test_parse_json() {
        let json = r#"
{
  "env": "dev",
  "metrics": {
    "enabled": false,
    "sink": { "type": "log" }
  }
}
"#;

        let config = parse_json(json).unwrap();
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.sink, SinkConfig::Log);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(parse_config_from_str("env: \"\"", "yaml").is_err());
        assert!(parse_config_from_str("metrics:\n  sink:\n    type: kafka\n", "yaml").is_err());
        assert!(parse_config_from_str("{}", "ini").is_err());
    }

    #[tokio::test]
    async fn test_parse_from_file_by_extension() {
        let dir = std::env::temp_dir().join(format!("beacon-config-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let path = dir.join("beacon.json");
        tokio::fs::write(&path, r#"{ "env": "file" }"#).await.unwrap();
        let config = parse_config_from_file(&path).await.unwrap();
        assert_eq!(config.env, "file");

        let unsupported = dir.join("beacon.ini");
        tokio::fs::write(&unsupported, "env=file").await.unwrap();
        assert!(parse_config_from_file(&unsupported).await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_env_override_can_repair_file_value() {
        let dir = std::env::temp_dir().join(format!("beacon-load-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let path = dir.join("beacon.yaml");
        tokio::fs::write(&path, "metrics:\n  sink:\n    type: statsd\n    port: 0\n")
            .await
            .unwrap();

        // the file alone is invalid
        assert!(parse_config_from_file(&path).await.is_err());
        assert!(load_config_with(Some(&path), Vec::<(String, String)>::new())
            .await
            .is_err());

        let config = load_config_with(Some(&path), [("BEACON_STATSD_PORT", "8125")])
            .await
            .unwrap();
        match config.metrics.sink {
            SinkConfig::Statsd(statsd) => assert_eq!(statsd.port, 8125),
            other => panic!("unexpected sink: {:?}", other),
        }

        // an override can also break an otherwise valid file
        let vars = [("BEACON_STATSD_PORT", "8125"), ("BEACON_ENV", "")];
        assert!(load_config_with(Some(&path), vars).await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
