//! signalslice-transport: WebSocket push channel and HTTP poll client.
//! Pure IO boundary. Outcomes are reported as `TransportSignal`s and decoded
//! messages; the dashboard controller decides what they mean.

pub mod endpoint;
pub mod error;
pub mod poll;
pub mod push;

pub use endpoint::BackendEndpoint;
pub use error::TransportError;
pub use poll::FeedClient;
pub use push::{PushInbound, PushSession, send_once};
