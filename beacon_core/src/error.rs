use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("Invalid sample rate {0}: must be in (0, 1]")]
    InvalidSampleRate(f64),

    #[error("Invalid metric event: {0}")]
    InvalidEvent(String),

    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Emit failed: {0}")]
    Emit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
