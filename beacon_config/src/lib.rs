pub mod config;
pub mod env;
pub mod parser;

pub use config::{
    AppConfig, AppConfigBuilder, LogConfig, LogFormat, MetricsConfig, ServerConfig, SinkConfig,
    StatsdConfig,
};
pub use env::{apply_env_overrides, prefixed_env_vars};
pub use parser::{load_config, load_config_with, parse_config_from_file, parse_config_from_str};
