//! Error types for the push and poll transports.

use signalslice_core::SignalSliceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("backend endpoint not resolvable: {0}")]
    Unresolvable(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Payload(#[from] SignalSliceError),

    #[error("timed out connecting to {0}")]
    Timeout(String),

    #[error("push channel closed")]
    Closed,
}
