//! `signalslice watch`: the single-threaded event loop that owns the
//! dashboard controller.
//!
//! Push frames, poll results, keyboard commands and timer deadlines are
//! serialised through one `tokio::select!`. Transport tasks only report over
//! channels; the controller is never shared.

use std::time::Duration;

use signalslice_core::controller::MSG_SCAN_REJECTED;
use signalslice_core::{
    Category, Clock, Command, DashboardConfig, DashboardController, FeedSnapshot, Severity,
    SystemClock,
};
use signalslice_transport::{
    BackendEndpoint, FeedClient, PushInbound, PushSession, TransportError,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::render::Renderer;

const PUSH_QUEUE: usize = 64;
const KEY_QUEUE: usize = 8;

/// Keyboard command, one per input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Scan,
    Retry,
    Quit,
}

pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim().chars().next()?.to_ascii_lowercase() {
        's' => Some(Key::Scan),
        'r' => Some(Key::Retry),
        'q' => Some(Key::Quit),
        _ => None,
    }
}

/// Push session plus the receiving half of its report channel. Dropping it
/// discards reports still queued from that session.
struct ActiveSession {
    session: PushSession,
    inbound: mpsc::Receiver<PushInbound>,
}

/// IO handles the loop owns on behalf of the controller.
struct Links {
    endpoint: BackendEndpoint,
    feed: FeedClient,
    cancel: CancellationToken,
    active: Option<ActiveSession>,
    polls: JoinSet<Result<FeedSnapshot, TransportError>>,
}

impl Links {
    fn new(endpoint: BackendEndpoint, feed: FeedClient, cancel: CancellationToken) -> Self {
        Self {
            endpoint,
            feed,
            cancel,
            active: None,
            polls: JoinSet::new(),
        }
    }

    async fn execute_all<C: Clock>(&mut self, controller: &mut DashboardController<C>) {
        for command in controller.drain_commands() {
            self.execute(command).await;
        }
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.close_session().await;
                let (tx, inbound) = mpsc::channel(PUSH_QUEUE);
                let session = PushSession::spawn(&self.endpoint, tx, self.cancel.child_token());
                self.active = Some(ActiveSession { session, inbound });
                tracing::debug!(url = %self.endpoint.push_url(), "push connect attempt");
            }
            Command::Disconnect => {
                if self.close_session().await {
                    tracing::debug!("push session closed");
                }
            }
            Command::FetchSnapshot => {
                let client = self.feed.clone();
                self.polls.spawn(async move { client.fetch().await });
            }
            Command::Send(message) => match self.active.as_ref() {
                Some(current) => {
                    if let Err(e) = current.session.send(message) {
                        tracing::warn!(event = message.name(), error = %e, "outbound message dropped");
                    }
                }
                None => {
                    tracing::warn!(event = message.name(), "no push session for outbound message");
                }
            },
        }
    }

    /// Returns whether a session was open.
    async fn close_session(&mut self) -> bool {
        match self.active.take() {
            Some(previous) => {
                previous.session.close().await;
                true
            }
            None => false,
        }
    }

    /// Close the push channel, abort in-flight polls and stop helper tasks.
    async fn teardown<C: Clock>(&mut self, controller: &mut DashboardController<C>) {
        controller.shutdown();
        self.execute_all(controller).await;
        self.polls.abort_all();
        self.cancel.cancel();
    }
}

/// Run the dashboard until `q`, ctrl-c, SIGTERM or stdin-driven quit.
pub async fn run_dashboard<R: Renderer>(
    config: DashboardConfig,
    endpoint: BackendEndpoint,
    mut renderer: R,
) -> anyhow::Result<()> {
    let clock = match config.utc_offset() {
        Some(offset) => SystemClock::new().with_utc_offset(offset),
        None => SystemClock::new(),
    };
    let origin = tokio::time::Instant::from_std(clock.origin());
    let feed = FeedClient::new(&endpoint, config.poll_interval())?;
    let mut controller = DashboardController::new(config, clock)?;

    let mut links = Links::new(endpoint, feed, CancellationToken::new());
    let mut keys = spawn_key_reader(links.cancel.child_token());
    let mut keys_open = true;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!(backend = %links.endpoint.push_url(), "dashboard starting");
    controller.start();

    loop {
        links.execute_all(&mut controller).await;
        if controller.take_dirty() {
            if let Err(e) = renderer.render(&controller.view()) {
                tracing::warn!(error = %e, "render skipped");
            }
        }

        let wake = controller
            .next_deadline_ms()
            .map(|at| origin + Duration::from_millis(at));

        tokio::select! {
            () = &mut shutdown => break,
            inbound = next_push(&mut links.active) => match inbound {
                Some(PushInbound::Signal(signal)) => controller.handle_signal(signal),
                Some(PushInbound::Message(message)) => {
                    controller.handle_push(message);
                }
                None => {
                    // Session task finished; its handle is no longer useful.
                    links.close_session().await;
                }
            },
            Some(joined) = links.polls.join_next(), if !links.polls.is_empty() => match joined {
                Ok(Ok(snapshot)) => {
                    controller.handle_poll(snapshot);
                }
                Ok(Err(e)) => controller.handle_poll_failure(&e.to_string()),
                Err(e) => controller.handle_poll_failure(&e.to_string()),
            },
            key = keys.recv(), if keys_open => match key {
                Some(Key::Scan) => {
                    if let Err(e) = controller.trigger_manual_scan() {
                        tracing::warn!(error = %e, "manual scan refused");
                        controller.record_local(Category::Error, MSG_SCAN_REJECTED, Severity::Critical);
                    }
                }
                Some(Key::Retry) => controller.retry(),
                Some(Key::Quit) => break,
                None => keys_open = false,
            },
            () = sleep_until(wake) => {
                controller.fire_due_timers();
            }
        }
    }

    links.teardown(&mut controller).await;
    tracing::info!(
        mode = %controller.mode(),
        uptime_ms = controller.clock().monotonic_ms(),
        "dashboard stopped"
    );
    Ok(())
}

async fn next_push(active: &mut Option<ActiveSession>) -> Option<PushInbound> {
    match active {
        Some(current) => current.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(wake: Option<tokio::time::Instant>) {
    match wake {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Forward stdin lines as keys. Ends on EOF, read error or cancellation.
fn spawn_key_reader(cancel: CancellationToken) -> mpsc::Receiver<Key> {
    let (tx, rx) = mpsc::channel(KEY_QUEUE);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    let Some(key) = parse_key(&line) else {
                        tracing::debug!(input = %line.trim(), "unrecognised key");
                        continue;
                    };
                    if tx.send(key).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::debug!(error = %e, "stdin closed");
                    return;
                }
            }
        }
    });
    rx
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use futures_util::{SinkExt, StreamExt};
    use signalslice_core::{ManualClock, TransportSignal};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    const WAIT: Duration = Duration::from_secs(5);

    /// WebSocket backend on a random port. The first client gets a
    /// `scanning_start` frame right after the handshake. The index of every
    /// client that goes away is sent on the returned channel.
    async fn ws_backend() -> (BackendEndpoint, mpsc::UnboundedReceiver<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (gone_tx, gone_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut next_index = 0;
            while let Ok((stream, _)) = listener.accept().await {
                let gone = gone_tx.clone();
                let index = next_index;
                next_index += 1;
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    if index == 0 {
                        ws.send(Message::Text(r#"{"event":"scanning_start"}"#.into()))
                            .await
                            .unwrap();
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_close() {
                            break;
                        }
                    }
                    let _ = gone.send(index);
                });
            }
        });
        let endpoint = BackendEndpoint::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        (endpoint, gone_rx)
    }

    /// HTTP backend that accepts connections and never answers.
    async fn silent_backend() -> BackendEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        BackendEndpoint::parse(&format!("http://127.0.0.1:{port}")).unwrap()
    }

    fn links(push: &BackendEndpoint, poll: &BackendEndpoint) -> Links {
        let feed = FeedClient::new(poll, Duration::from_secs(30)).unwrap();
        Links::new(push.clone(), feed, CancellationToken::new())
    }

    async fn next_report(links: &mut Links) -> PushInbound {
        timeout(WAIT, next_push(&mut links.active))
            .await
            .expect("timeout waiting for push report")
            .expect("report channel closed")
    }

    async fn wait_queued(links: &Links, count: usize) {
        timeout(WAIT, async {
            while !links
                .active
                .as_ref()
                .is_some_and(|current| current.inbound.len() >= count)
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reports never queued");
    }

    #[tokio::test]
    async fn replacing_session_discards_its_queued_reports() {
        let (endpoint, mut gone) = ws_backend().await;
        let mut links = links(&endpoint, &endpoint);

        links.execute(Command::Connect).await;
        // Handshake report and the first frame stay unread.
        wait_queued(&links, 2).await;

        links.execute(Command::Connect).await;
        assert_eq!(timeout(WAIT, gone.recv()).await.unwrap(), Some(0));
        assert_eq!(
            next_report(&mut links).await,
            PushInbound::Signal(TransportSignal::HandshakeSucceeded)
        );
        let stale = timeout(Duration::from_millis(200), next_push(&mut links.active)).await;
        assert!(stale.is_err(), "unexpected report: {stale:?}");
        links.close_session().await;
    }

    #[tokio::test]
    async fn disconnect_closes_active_session() {
        let (endpoint, mut gone) = ws_backend().await;
        let mut links = links(&endpoint, &endpoint);
        links.execute(Command::Connect).await;
        assert_eq!(
            next_report(&mut links).await,
            PushInbound::Signal(TransportSignal::HandshakeSucceeded)
        );

        links.execute(Command::Disconnect).await;
        assert!(links.active.is_none());
        assert_eq!(timeout(WAIT, gone.recv()).await.unwrap(), Some(0));
        assert!(!links.close_session().await);
    }

    #[tokio::test]
    async fn teardown_closes_push_and_aborts_polls() {
        let (endpoint, mut gone) = ws_backend().await;
        let silent = silent_backend().await;
        let mut links = links(&endpoint, &silent);
        let clock = ManualClock::new(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let mut controller =
            DashboardController::new(DashboardConfig::default(), clock).unwrap();

        links.execute(Command::Connect).await;
        assert_eq!(
            next_report(&mut links).await,
            PushInbound::Signal(TransportSignal::HandshakeSucceeded)
        );
        links.execute(Command::FetchSnapshot).await;
        assert_eq!(links.polls.len(), 1);

        links.teardown(&mut controller).await;
        assert!(links.active.is_none());
        assert!(links.cancel.is_cancelled());
        assert!(controller.drain_commands().is_empty());
        assert_eq!(timeout(WAIT, gone.recv()).await.unwrap(), Some(0));

        let joined = timeout(WAIT, links.polls.join_next())
            .await
            .unwrap()
            .expect("aborted poll is still joinable");
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[test]
    fn keys_from_lines() {
        assert_eq!(parse_key("s"), Some(Key::Scan));
        assert_eq!(parse_key("  R\n"), Some(Key::Retry));
        assert_eq!(parse_key("quit"), Some(Key::Quit));
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("x"), None);
    }
}
