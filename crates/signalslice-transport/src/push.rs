//! WebSocket push channel.
//!
//! One [`PushSession`] per connect attempt. The session task resolves the
//! endpoint, performs the handshake and then forwards decoded frames. It never
//! touches dashboard state: everything it observes is reported as a
//! [`PushInbound`] on an mpsc channel, in order.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use signalslice_core::{OutboundMessage, PushMessage, TransportSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::endpoint::BackendEndpoint;
use crate::error::TransportError;

const OUTBOUND_QUEUE: usize = 8;

/// Report from a push session to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PushInbound {
    Signal(TransportSignal),
    Message(PushMessage),
}

/// Handle to a running push session task.
#[derive(Debug)]
pub struct PushSession {
    outbound: mpsc::Sender<OutboundMessage>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PushSession {
    /// Start a connect attempt in the background. Reports stop as soon as
    /// `cancel` fires.
    pub fn spawn(
        endpoint: &BackendEndpoint,
        inbound: mpsc::Sender<PushInbound>,
        cancel: CancellationToken,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let target = SessionTarget {
            authority: endpoint.authority().to_string(),
            push_url: endpoint.push_url().to_string(),
        };
        let reporter = Reporter {
            tx: inbound,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run_session(target, reporter, outbound_rx, cancel.clone()));
        Self {
            outbound,
            cancel,
            task,
        }
    }

    /// Queue an outbound message. Fire-and-forget: no acknowledgment.
    pub fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.outbound
            .try_send(message)
            .map_err(|_| TransportError::Closed)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the session and wait for its task to finish.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "push session task ended abnormally");
        }
    }
}

struct SessionTarget {
    authority: String,
    push_url: String,
}

struct Reporter {
    tx: mpsc::Sender<PushInbound>,
    cancel: CancellationToken,
}

impl Reporter {
    /// Returns false once the session should stop reporting.
    async fn report(&self, item: PushInbound) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(item).await.is_ok()
    }

    async fn signal(&self, signal: TransportSignal) -> bool {
        self.report(PushInbound::Signal(signal)).await
    }
}

async fn run_session(
    target: SessionTarget,
    reporter: Reporter,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    cancel: CancellationToken,
) {
    // ---- Setup: the endpoint must resolve before a handshake is attempted ----
    let resolved = tokio::select! {
        _ = cancel.cancelled() => return,
        r = tokio::net::lookup_host(target.authority.as_str()) => r,
    };
    let reachable = match resolved {
        Ok(mut addrs) => addrs.next().is_some(),
        Err(e) => {
            tracing::debug!(authority = %target.authority, error = %e, "push endpoint lookup failed");
            false
        }
    };
    if !reachable {
        reporter
            .signal(TransportSignal::SetupDeferred {
                reason: TransportError::Unresolvable(target.authority.clone()).to_string(),
            })
            .await;
        return;
    }

    // ---- Handshake ----
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        r = tokio_tungstenite::connect_async(target.push_url.as_str()) => r,
    };
    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            reporter
                .signal(TransportSignal::HandshakeFailed {
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    };
    tracing::info!(url = %target.push_url, "push channel connected");
    if !reporter.signal(TransportSignal::HandshakeSucceeded).await {
        return;
    }

    // ---- Frames ----
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "push channel close frame not sent");
                }
                return;
            }
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(message.to_json())).await {
                    let reason = format!("failed to send {}: {e}", message.name());
                    if !reporter.signal(TransportSignal::TransportError { reason }).await {
                        return;
                    }
                } else {
                    tracing::debug!(event = message.name(), "push message sent");
                }
            }
            frame = read.next() => {
                let reason = match frame {
                    Some(Ok(Message::Text(text))) => {
                        match PushMessage::from_json(&text) {
                            Ok(message) => {
                                if !reporter.report(PushInbound::Message(message)).await {
                                    return;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "dropping malformed push frame"),
                        }
                        continue;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            tracing::debug!(error = %e, "pong not sent");
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => e.to_string(),
                    None => "stream ended".to_string(),
                };
                tracing::info!(%reason, "push channel disconnected");
                reporter.signal(TransportSignal::Disconnected { reason }).await;
                return;
            }
        }
    }
}

/// Connect, send a single message and close. Used by one-shot commands.
pub async fn send_once(
    endpoint: &BackendEndpoint,
    message: OutboundMessage,
    timeout: Duration,
) -> Result<(), TransportError> {
    let url = endpoint.push_url().to_string();
    let attempt =
        tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await;
    let (mut ws, _response) = match attempt {
        Ok(result) => result?,
        Err(_) => return Err(TransportError::Timeout(url)),
    };
    ws.send(Message::Text(message.to_json())).await?;
    ws.close(None).await?;
    tracing::info!(%url, event = message.name(), "message sent");
    Ok(())
}
