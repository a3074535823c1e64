//! Dashboard controller: single owner and only writer of the event buffer,
//! coalescer, arbitrator state, gauges and timers.
//!
//! The controller performs no IO. Transports report through
//! [`handle_signal`](DashboardController::handle_signal),
//! [`handle_push`](DashboardController::handle_push) and
//! [`handle_poll`](DashboardController::handle_poll); IO the controller wants
//! done is queued as [`Command`]s and collected with
//! [`drain_commands`](DashboardController::drain_commands).

use std::collections::VecDeque;
use std::time::Duration;

use chrono::NaiveTime;

use crate::arbitrator::{
    ArbitratorPolicy, Effect, SnapshotVerdict, SourceMode, SourceState, TransportSignal,
    authorize_manual_action, evaluate_snapshot, transition,
};
use crate::buffer::EventBuffer;
use crate::coalescer::{Admission, UpdateCoalescer};
use crate::config::DashboardConfig;
use crate::error::SignalSliceError;
use crate::gauges::{IndexGauge, Notice, ScanStats};
use crate::schedule::{Clock, Scheduler, TimerKind, TimerTable};
use crate::types::{
    AnomalyNotice, Category, Event, FeedSnapshot, IndexKind, InitialState, OutboundMessage,
    PushMessage, Severity,
};

pub const MSG_INIT: &str = "SignalSlice dashboard loading...";
pub const MSG_MANUAL_SCAN: &str = "Manual scan initiated by user";
pub const MSG_SCAN_REJECTED: &str = "Cannot trigger scan - not connected to backend";
pub const MSG_SCAN_COMPLETED: &str = "Scan completed";

/// IO request for the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open the push channel.
    Connect,
    /// Close the push channel or abandon a pending attempt.
    Disconnect,
    /// Fetch one poll snapshot.
    FetchSnapshot,
    Send(OutboundMessage),
}

/// Read-only view for the rendering collaborator.
#[derive(Debug, Clone, Copy)]
pub struct DashboardView<'a> {
    pub mode: SourceMode,
    pub events: &'a EventBuffer,
    pub pizza: &'a IndexGauge,
    pub gay_bar: &'a IndexGauge,
    pub stats: &'a ScanStats,
    pub notice: Option<&'a Notice>,
    pub now_ms: u64,
    pub wall_time: NaiveTime,
}

pub struct DashboardController<C: Clock, S: Scheduler = TimerTable> {
    config: DashboardConfig,
    policy: ArbitratorPolicy,
    clock: C,
    scheduler: S,
    source: SourceState,
    buffer: EventBuffer,
    coalescer: UpdateCoalescer,
    pizza: IndexGauge,
    gay_bar: IndexGauge,
    stats: ScanStats,
    notice: Option<Notice>,
    commands: VecDeque<Command>,
    dirty: bool,
    started: bool,
}

impl<C: Clock> DashboardController<C, TimerTable> {
    pub fn new(config: DashboardConfig, clock: C) -> Result<Self, SignalSliceError> {
        Self::with_scheduler(config, clock, TimerTable::new())
    }
}

impl<C: Clock, S: Scheduler> DashboardController<C, S> {
    pub fn with_scheduler(
        config: DashboardConfig,
        clock: C,
        scheduler: S,
    ) -> Result<Self, SignalSliceError> {
        config.validate()?;
        Ok(Self {
            policy: config.policy(),
            buffer: EventBuffer::new(config.capacity)?,
            coalescer: UpdateCoalescer::new(config.minimum_interval()),
            pizza: IndexGauge::new(IndexKind::Pizza, config.chart_points),
            gay_bar: IndexGauge::new(IndexKind::GayBar, config.chart_points),
            config,
            clock,
            scheduler,
            source: SourceState::connecting(),
            stats: ScanStats::default(),
            notice: None,
            commands: VecDeque::new(),
            dirty: true,
            started: false,
        })
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Record the init event and arm the first connect attempt, its timeout
    /// and the clock refresh. Calling it twice has no effect.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        self.record_local(Category::Init, MSG_INIT, Severity::Normal);

        let now = self.clock.monotonic_ms();
        let delay = self.config.connect_delay();
        self.scheduler
            .arm(TimerKind::ConnectRetry, after(now, delay), None);
        self.scheduler.arm(
            TimerKind::ConnectTimeout,
            after(now, delay + self.config.connect_timeout()),
            None,
        );
        let refresh = self.config.clock_refresh();
        self.scheduler
            .arm(TimerKind::ClockRefresh, after(now, refresh), Some(refresh));
        tracing::debug!(connect_delay_ms = self.config.connect_delay_ms, "dashboard started");
    }

    /// Stop every timer and close the push channel.
    pub fn shutdown(&mut self) {
        self.scheduler.disarm_all();
        self.commands.push_back(Command::Disconnect);
        tracing::info!(mode = %self.source.mode, "dashboard shutting down");
    }

    // ─── Transport signals ──────────────────────────────────────────

    pub fn handle_signal(&mut self, signal: TransportSignal) {
        match &signal {
            TransportSignal::SetupDeferred { reason } => {
                tracing::warn!(%reason, "push transport setup deferred");
            }
            TransportSignal::HandshakeFailed { reason }
            | TransportSignal::Disconnected { reason }
            | TransportSignal::TransportError { reason } => {
                tracing::warn!(%reason, signal = ?signal, "push transport problem");
            }
            _ => {}
        }

        let previous = self.source.mode;
        let step = transition(&self.source, signal, &self.policy, self.clock.wall_time());
        self.source = step.state;
        if self.source.mode != previous {
            tracing::info!(from = %previous, to = %self.source.mode, "source mode changed");
            self.dirty = true;
        }
        for event in step.events {
            self.insert(event);
        }
        for effect in step.effects {
            self.apply_effect(effect);
        }
    }

    /// Manual retry out of `FAILED`.
    pub fn retry(&mut self) {
        self.handle_signal(TransportSignal::Retry);
    }

    fn apply_effect(&mut self, effect: Effect) {
        let now = self.clock.monotonic_ms();
        match effect {
            Effect::Connect => self.commands.push_back(Command::Connect),
            Effect::Disconnect => self.commands.push_back(Command::Disconnect),
            Effect::RetryConnectAfter(delay) => {
                self.scheduler
                    .arm(TimerKind::ConnectRetry, after(now, delay), None);
            }
            Effect::ArmConnectTimeout => {
                self.scheduler.arm(
                    TimerKind::ConnectTimeout,
                    after(now, self.config.connect_timeout()),
                    None,
                );
            }
            Effect::CancelConnectTimeout => {
                self.scheduler.disarm(TimerKind::ConnectTimeout);
                self.scheduler.disarm(TimerKind::ConnectRetry);
            }
            Effect::StartPolling => {
                // First fetch right away, then on the fixed interval.
                self.scheduler
                    .arm(TimerKind::Poll, now, Some(self.config.poll_interval()));
            }
            Effect::StopPolling => self.scheduler.disarm(TimerKind::Poll),
            Effect::StartReconnecting => {
                let every = self.config.reconnect_interval();
                self.scheduler
                    .arm(TimerKind::Reconnect, after(now, every), Some(every));
            }
            Effect::StopReconnecting => self.scheduler.disarm(TimerKind::Reconnect),
        }
    }

    // ─── Timers ─────────────────────────────────────────────────────

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    /// Fire every timer due now. Returns the timers that fired.
    pub fn fire_due_timers(&mut self) -> Vec<TimerKind> {
        let fired = self.scheduler.pop_due(self.clock.monotonic_ms());
        for timer in &fired {
            match timer {
                TimerKind::ConnectRetry => {
                    if self.source.mode == SourceMode::Connecting {
                        self.commands.push_back(Command::Connect);
                    }
                }
                TimerKind::ConnectTimeout => {
                    self.handle_signal(TransportSignal::ConnectTimedOut);
                }
                TimerKind::Poll => {
                    if self.source.mode == SourceMode::Polling {
                        self.commands.push_back(Command::FetchSnapshot);
                    }
                }
                TimerKind::Reconnect => {
                    if self.source.mode == SourceMode::Polling {
                        self.commands.push_back(Command::Connect);
                    }
                }
                TimerKind::ClockRefresh => self.dirty = true,
            }
        }
        fired
    }

    // ─── Push channel ───────────────────────────────────────────────

    /// Apply a push message. Ignored unless the push channel is authoritative.
    /// Returns whether the message was applied.
    pub fn handle_push(&mut self, message: PushMessage) -> bool {
        if !self.source.is_live() {
            tracing::debug!(
                message = message.name(),
                mode = %self.source.mode,
                "push message ignored: push channel not authoritative"
            );
            return false;
        }

        let now = self.clock.monotonic_ms();
        let at = self.clock.wall_time();
        match message {
            PushMessage::InitialState(state) => self.apply_initial_state(state, now, at),
            PushMessage::ActivityUpdate(event) => {
                match self.coalescer.offer(&mut self.buffer, event, now) {
                    Admission::Accepted => self.dirty = true,
                    Admission::Rejected => {
                        tracing::trace!("activity update dropped by coalescer");
                        return false;
                    }
                }
            }
            PushMessage::PizzaIndexUpdate(update) => {
                self.pizza.apply(&update, at);
                self.dirty = true;
            }
            PushMessage::GayBarIndexUpdate(update) => {
                self.gay_bar.apply(&update, at);
                self.dirty = true;
            }
            PushMessage::ScanStatsUpdate(update) => {
                self.stats.scan_count = update.scan_count;
                self.stats.last_scan_ms = Some(now);
                self.raise_notice(MSG_SCAN_COMPLETED, Severity::Success, now);
            }
            PushMessage::AnomalyDetected(notice) => self.apply_anomaly(notice, now, at),
            PushMessage::ScanningStart => {
                self.stats.scanning = true;
                self.dirty = true;
            }
            PushMessage::ScanningComplete => {
                self.stats.scanning = false;
                self.stats.last_scan_ms = Some(now);
                self.dirty = true;
            }
        }
        true
    }

    fn apply_initial_state(&mut self, state: InitialState, now: u64, at: NaiveTime) {
        self.pizza.reset(state.pizza_index, at);
        self.gay_bar.reset(
            state.gay_bar_index.unwrap_or(IndexKind::GayBar.baseline()),
            at,
        );
        self.stats.active_locations = state.active_locations;
        self.stats.scan_count = state.scan_count;
        self.stats.anomaly_count = state.anomaly_count;
        self.stats.scanner_running = state.scanner_running;
        if state.has_scanned() {
            self.stats.last_scan_ms = Some(now);
        }
        // Added on top of local events, oldest first; capacity evicts the rest.
        let capacity = self.buffer.capacity();
        for event in state.activity_feed.iter().take(capacity).rev() {
            self.buffer.insert(event.clone());
        }
        self.dirty = true;
        tracing::info!(
            feed_items = state.activity_feed.len(),
            scan_count = state.scan_count,
            "initial state applied"
        );
    }

    fn apply_anomaly(&mut self, notice: AnomalyNotice, now: u64, at: NaiveTime) {
        self.stats.anomaly_count = notice
            .anomaly_count
            .unwrap_or_else(|| self.stats.anomaly_count.saturating_add(1));
        let text = if notice.title.is_empty() {
            notice.message.clone()
        } else {
            format!("{}: {}", notice.title, notice.message)
        };
        self.raise_notice(&notice.message, Severity::Critical, now);
        self.insert(Event::new(Category::Anomaly, text, Severity::Critical, at));
        self.pizza.bump_for_anomaly(at);
        tracing::info!(anomaly_count = self.stats.anomaly_count, "anomaly detected");
    }

    fn raise_notice(&mut self, text: &str, severity: Severity, now: u64) {
        self.notice = Some(Notice {
            text: text.to_string(),
            severity,
            raised_ms: now,
        });
        self.dirty = true;
    }

    // ─── Polling ────────────────────────────────────────────────────

    /// Apply a poll snapshot under the full-replace policy.
    pub fn handle_poll(&mut self, snapshot: FeedSnapshot) -> SnapshotVerdict {
        let events = snapshot.into_events();
        let verdict = evaluate_snapshot(&mut self.source, &events);
        match verdict {
            SnapshotVerdict::Fresh => {
                self.buffer.replace_with(&events);
                self.dirty = true;
                tracing::debug!(items = events.len(), "poll snapshot applied");
            }
            SnapshotVerdict::Unchanged => tracing::debug!("no new activity updates"),
            SnapshotVerdict::Empty => tracing::debug!("poll snapshot empty"),
            SnapshotVerdict::NotPolling => {
                tracing::debug!(mode = %self.source.mode, "poll snapshot ignored");
            }
        }
        verdict
    }

    /// Fetch failures are logged only; polling keeps its fixed schedule.
    pub fn handle_poll_failure(&mut self, reason: &str) {
        tracing::warn!(%reason, "failed to fetch activity updates");
    }

    // ─── Local actions ──────────────────────────────────────────────

    /// Ask the backend for a manual scan. Only allowed while live; on failure
    /// the buffer is left untouched and the caller decides what to log.
    pub fn trigger_manual_scan(&mut self) -> Result<(), SignalSliceError> {
        authorize_manual_action(&self.source)?;
        self.commands
            .push_back(Command::Send(OutboundMessage::ManualScan));
        self.record_local(Category::Manual, MSG_MANUAL_SCAN, Severity::Normal);
        Ok(())
    }

    /// Insert a locally originated event, bypassing the coalescer.
    pub fn record_local(&mut self, category: Category, message: &str, severity: Severity) {
        let event = Event::new(category, message, severity, self.clock.wall_time());
        self.insert(event);
    }

    fn insert(&mut self, event: Event) {
        self.buffer.insert(event);
        self.dirty = true;
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn drain_commands(&mut self) -> Vec<Command> {
        self.commands.drain(..).collect()
    }

    /// Whether the view changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn view(&self) -> DashboardView<'_> {
        DashboardView {
            mode: self.source.mode,
            events: &self.buffer,
            pizza: &self.pizza,
            gay_bar: &self.gay_bar,
            stats: &self.stats,
            notice: self.notice.as_ref(),
            now_ms: self.clock.monotonic_ms(),
            wall_time: self.clock.wall_time(),
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.source.mode
    }

    pub fn source_state(&self) -> &SourceState {
        &self.source
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn gauge(&self, kind: IndexKind) -> &IndexGauge {
        match kind {
            IndexKind::Pizza => &self.pizza,
            IndexKind::GayBar => &self.gay_bar,
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn coalescer(&self) -> &UpdateCoalescer {
        &self.coalescer
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }
}

fn after(now_ms: u64, delay: Duration) -> u64 {
    now_ms.saturating_add(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}
