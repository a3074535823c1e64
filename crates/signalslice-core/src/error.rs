//! Error types for the dashboard core.

use thiserror::Error;

use crate::arbitrator::SourceMode;

#[derive(Debug, Error)]
pub enum SignalSliceError {
    #[error("not connected to backend (source mode: {mode})")]
    NotConnected { mode: SourceMode },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config io error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
}
