//! Source arbitration finite state machine.
//!
//! Decides whether the push channel (`Live`) or periodic polling (`Polling`)
//! owns the event buffer. Pure and side-effect free: [`transition`] maps
//! `(state, signal)` to the next state, the events to record, and the
//! [`Effect`]s the owner must carry out.

use std::fmt;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::SignalSliceError;
use crate::types::{Category, Event, Severity};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default fixed delay before retrying a deferred transport setup.
pub const DEFAULT_SETUP_RETRY_DELAY_MS: u64 = 1_000;

pub const MSG_CONNECTED: &str = "Connected to real-time data stream";
pub const MSG_RECONNECTED: &str = "Reconnected to real-time data stream";
pub const MSG_FALLBACK: &str = "Using HTTP polling for updates";
pub const MSG_TIMED_OUT: &str = "Failed to connect to backend - check server status";
pub const MSG_DISCONNECTED: &str = "Connection to data stream lost";
pub const MSG_NO_FALLBACK: &str = "Real-time stream unavailable and polling fallback disabled";
pub const MSG_RETRYING: &str = "Retrying connection to backend";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which transport is authoritative.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceMode {
    #[default]
    Connecting,
    Live,
    Polling,
    /// Both transports unavailable. Terminal until [`TransportSignal::Retry`].
    Failed,
}

impl SourceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Live => "LIVE",
            Self::Polling => "POLLING",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arbitrator state: the authoritative mode plus the poll de-duplication key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceState {
    pub mode: SourceMode,
    /// `occurred_at` of the newest item of the last applied poll snapshot.
    pub last_seen: Option<NaiveTime>,
}

impl SourceState {
    pub fn connecting() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.mode == SourceMode::Live
    }
}

/// Transport outcome delivered to the arbitrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    HandshakeSucceeded,
    HandshakeFailed { reason: String },
    /// The transport could not even start (endpoint not resolvable yet).
    SetupDeferred { reason: String },
    ConnectTimedOut,
    Disconnected { reason: String },
    /// Transport-level failure that does not by itself change the mode.
    TransportError { reason: String },
    /// Manual retry request.
    Retry,
}

/// Abstract request for the owner: timer or IO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Connect,
    RetryConnectAfter(Duration),
    ArmConnectTimeout,
    CancelConnectTimeout,
    Disconnect,
    StartPolling,
    StopPolling,
    StartReconnecting,
    StopReconnecting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbitratorPolicy {
    /// Fall back to polling when the push channel is unavailable.
    pub poll_fallback: bool,
    /// Return from `Polling` to `Live` when a later handshake succeeds.
    pub recover_to_live: bool,
    pub setup_retry_delay: Duration,
}

impl Default for ArbitratorPolicy {
    fn default() -> Self {
        Self {
            poll_fallback: true,
            recover_to_live: false,
            setup_retry_delay: Duration::from_millis(DEFAULT_SETUP_RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SourceState,
    pub events: Vec<Event>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(previous: &SourceState) -> Self {
        Self {
            state: previous.clone(),
            events: Vec::new(),
            effects: Vec::new(),
        }
    }
}

/// Outcome of offering a poll snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotVerdict {
    /// Polling is not authoritative; snapshot discarded.
    NotPolling,
    /// No items; snapshot discarded.
    Empty,
    /// Newest item matches the last-seen key; snapshot discarded.
    Unchanged,
    /// Replace the whole buffer with the snapshot.
    Fresh,
}

// ---------------------------------------------------------------------------
// Transition function
// ---------------------------------------------------------------------------

/// Pure state machine: apply `signal` to `previous`.
///
/// `at` stamps the events emitted by this transition.
#[must_use]
pub fn transition(
    previous: &SourceState,
    signal: TransportSignal,
    policy: &ArbitratorPolicy,
    at: NaiveTime,
) -> Transition {
    let event = |category: Category, message: &str, severity: Severity| {
        Event::new(category, message, severity, at)
    };

    let mut next = Transition::unchanged(previous);

    match (previous.mode, signal) {
        (_, TransportSignal::TransportError { reason }) => {
            next.events
                .push(event(Category::Error, &reason, Severity::Critical));
        }

        (SourceMode::Connecting, TransportSignal::HandshakeSucceeded) => {
            next.state.mode = SourceMode::Live;
            next.effects.push(Effect::CancelConnectTimeout);
            next.events
                .push(event(Category::Connect, MSG_CONNECTED, Severity::Success));
        }
        (SourceMode::Connecting, TransportSignal::HandshakeFailed { reason })
        | (SourceMode::Connecting, TransportSignal::Disconnected { reason }) => {
            next.effects.push(Effect::CancelConnectTimeout);
            next.events.push(event(
                Category::Error,
                &format!("Connection failed: {reason}"),
                Severity::Critical,
            ));
            fall_back(&mut next, policy, at);
        }
        (SourceMode::Connecting, TransportSignal::ConnectTimedOut) => {
            next.effects.push(Effect::Disconnect);
            next.events
                .push(event(Category::Error, MSG_TIMED_OUT, Severity::Critical));
            fall_back(&mut next, policy, at);
        }
        (SourceMode::Connecting, TransportSignal::SetupDeferred { .. }) => {
            next.effects
                .push(Effect::RetryConnectAfter(policy.setup_retry_delay));
        }

        (SourceMode::Live, TransportSignal::Disconnected { .. }) => {
            next.events.push(event(
                Category::Disconnect,
                MSG_DISCONNECTED,
                Severity::Critical,
            ));
            fall_back(&mut next, policy, at);
        }

        (SourceMode::Polling, TransportSignal::HandshakeSucceeded) => {
            if policy.recover_to_live {
                next.state.mode = SourceMode::Live;
                next.state.last_seen = None;
                next.effects.push(Effect::StopPolling);
                next.effects.push(Effect::StopReconnecting);
                next.events
                    .push(event(Category::Connect, MSG_RECONNECTED, Severity::Success));
            } else {
                // Late handshake: polling stays authoritative.
                next.effects.push(Effect::Disconnect);
            }
        }

        (SourceMode::Failed, TransportSignal::HandshakeSucceeded) => {
            next.effects.push(Effect::Disconnect);
        }
        (SourceMode::Failed, TransportSignal::Retry) => {
            next.state.mode = SourceMode::Connecting;
            next.effects.push(Effect::Connect);
            next.effects.push(Effect::ArmConnectTimeout);
            next.events
                .push(event(Category::System, MSG_RETRYING, Severity::Normal));
        }

        _ => {}
    }

    next
}

/// Move out of the push channel: polling if allowed, otherwise `Failed`.
fn fall_back(next: &mut Transition, policy: &ArbitratorPolicy, at: NaiveTime) {
    if policy.poll_fallback {
        next.state.mode = SourceMode::Polling;
        next.state.last_seen = None;
        next.effects.push(Effect::StartPolling);
        if policy.recover_to_live {
            next.effects.push(Effect::StartReconnecting);
        }
        next.events.push(Event::new(
            Category::Fallback,
            MSG_FALLBACK,
            Severity::Warning,
            at,
        ));
    } else {
        next.state.mode = SourceMode::Failed;
        next.events.push(Event::new(
            Category::Error,
            MSG_NO_FALLBACK,
            Severity::Critical,
            at,
        ));
    }
}

/// Decide what to do with a poll snapshot (newest first) and update the
/// de-duplication key.
///
/// A fresh snapshot replaces the whole buffer; there is no partial merge.
pub fn evaluate_snapshot(state: &mut SourceState, snapshot: &[Event]) -> SnapshotVerdict {
    if state.mode != SourceMode::Polling {
        return SnapshotVerdict::NotPolling;
    }
    let Some(newest) = snapshot.first() else {
        return SnapshotVerdict::Empty;
    };
    if state.last_seen == Some(newest.occurred_at()) {
        return SnapshotVerdict::Unchanged;
    }
    state.last_seen = Some(newest.occurred_at());
    SnapshotVerdict::Fresh
}

/// Manual actions are only permitted while the push channel is live.
pub fn authorize_manual_action(state: &SourceState) -> Result<(), SignalSliceError> {
    if state.is_live() {
        Ok(())
    } else {
        Err(SignalSliceError::NotConnected { mode: state.mode })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
