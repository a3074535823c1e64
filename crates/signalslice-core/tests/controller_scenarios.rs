use std::time::Duration;

use chrono::NaiveTime;
use signalslice_core::arbitrator::MSG_CONNECTED;
use signalslice_core::controller::{MSG_INIT, MSG_MANUAL_SCAN};
use signalslice_core::{
    AnomalyNotice, Category, Clock, Command, DashboardConfig, DashboardController, Event,
    FeedSnapshot, IndexKind, IndexUpdate, InitialState, ManualClock, OutboundMessage,
    PushMessage, Scheduler, Severity, SignalSliceError, SnapshotVerdict, SourceMode, TimerKind,
    TransportSignal,
};

fn noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap()
}

fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

fn ev(message: &str, at: NaiveTime) -> Event {
    Event::new(Category::Update, message, Severity::Normal, at)
}

fn started(config: DashboardConfig) -> (DashboardController<ManualClock>, ManualClock) {
    let clock = ManualClock::new(noon());
    let mut controller = DashboardController::new(config, clock.clone()).unwrap();
    controller.start();
    (controller, clock)
}

fn messages(controller: &DashboardController<ManualClock>) -> Vec<String> {
    controller
        .buffer()
        .iter()
        .map(|e| e.message().to_string())
        .collect()
}

/// Drive the controller to `Live` through the normal startup path.
fn live(config: DashboardConfig) -> (DashboardController<ManualClock>, ManualClock) {
    let (mut controller, clock) = started(config);
    clock.advance(Duration::from_millis(500));
    controller.fire_due_timers();
    assert_eq!(controller.drain_commands(), vec![Command::Connect]);
    controller.handle_signal(TransportSignal::HandshakeSucceeded);
    assert_eq!(controller.mode(), SourceMode::Live);
    (controller, clock)
}

/// Drive the controller to `Polling` through a connect timeout.
fn polling(config: DashboardConfig) -> (DashboardController<ManualClock>, ManualClock) {
    let (mut controller, clock) = started(config);
    clock.advance(Duration::from_millis(5_500));
    controller.fire_due_timers();
    assert_eq!(controller.mode(), SourceMode::Polling);
    controller.drain_commands();
    (controller, clock)
}

// ─── Startup ────────────────────────────────────────────────────────

#[test]
fn start_records_init_and_defers_connect() {
    let (mut controller, clock) = started(DashboardConfig::default());
    assert_eq!(messages(&controller), vec![MSG_INIT.to_string()]);
    assert_eq!(controller.mode(), SourceMode::Connecting);
    assert!(controller.drain_commands().is_empty());

    clock.advance(Duration::from_millis(499));
    assert!(controller.fire_due_timers().is_empty());

    clock.advance(Duration::from_millis(1));
    assert_eq!(controller.fire_due_timers(), vec![TimerKind::ConnectRetry]);
    assert_eq!(controller.drain_commands(), vec![Command::Connect]);
}

#[test]
fn start_twice_is_a_noop() {
    let (mut controller, _clock) = started(DashboardConfig::default());
    controller.start();
    assert_eq!(controller.buffer().len(), 1);
}

#[test]
fn invalid_config_is_rejected() {
    let config = DashboardConfig {
        capacity: 0,
        ..DashboardConfig::default()
    };
    let result = DashboardController::new(config, ManualClock::new(noon()));
    assert!(matches!(result, Err(SignalSliceError::InvalidConfig(_))));
}

#[test]
fn handshake_goes_live_and_cancels_timeout() {
    let (mut controller, clock) = live(DashboardConfig::default());
    assert!(!controller.scheduler().is_armed(TimerKind::ConnectTimeout));
    assert_eq!(
        controller.buffer().newest().map(|e| e.category().clone()),
        Some(Category::Connect)
    );

    clock.advance(Duration::from_secs(60));
    controller.fire_due_timers();
    assert_eq!(controller.mode(), SourceMode::Live);
    assert!(controller.drain_commands().is_empty());
}

// ─── Fallback ───────────────────────────────────────────────────────

#[test]
fn connect_timeout_falls_back_to_polling() {
    let (mut controller, clock) = started(DashboardConfig::default());
    clock.advance(Duration::from_millis(5_500));
    controller.fire_due_timers();

    assert_eq!(controller.mode(), SourceMode::Polling);
    assert_eq!(
        controller.drain_commands(),
        vec![Command::Connect, Command::Disconnect]
    );
    let categories: Vec<Category> = controller
        .buffer()
        .iter()
        .map(|e| e.category().clone())
        .collect();
    assert_eq!(
        categories,
        vec![Category::Fallback, Category::Error, Category::Init]
    );

    // First fetch is due immediately, then every poll interval.
    assert_eq!(controller.fire_due_timers(), vec![TimerKind::Poll]);
    assert_eq!(controller.drain_commands(), vec![Command::FetchSnapshot]);
    clock.advance(Duration::from_secs(15));
    controller.fire_due_timers();
    assert_eq!(controller.drain_commands(), vec![Command::FetchSnapshot]);
}

#[test]
fn handshake_failure_falls_back_with_reason() {
    let (mut controller, _clock) = started(DashboardConfig::default());
    controller.handle_signal(TransportSignal::HandshakeFailed {
        reason: "connection refused".into(),
    });
    assert_eq!(controller.mode(), SourceMode::Polling);
    assert!(
        messages(&controller)
            .iter()
            .any(|m| m == "Connection failed: connection refused")
    );
    assert!(!controller.scheduler().is_armed(TimerKind::ConnectTimeout));
}

#[test]
fn live_disconnect_falls_back_to_polling() {
    let (mut controller, _clock) = live(DashboardConfig::default());
    controller.handle_signal(TransportSignal::Disconnected {
        reason: "reset by peer".into(),
    });
    assert_eq!(controller.mode(), SourceMode::Polling);
    assert!(controller.scheduler().is_armed(TimerKind::Poll));
}

#[test]
fn late_handshake_after_fallback_is_closed() {
    let (mut controller, _clock) = polling(DashboardConfig::default());
    controller.handle_signal(TransportSignal::HandshakeSucceeded);
    assert_eq!(controller.mode(), SourceMode::Polling);
    assert_eq!(controller.drain_commands(), vec![Command::Disconnect]);
}

#[test]
fn setup_deferred_retries_then_times_out() {
    let (mut controller, clock) = started(DashboardConfig::default());
    clock.advance(Duration::from_millis(500));
    controller.fire_due_timers();
    controller.drain_commands();

    controller.handle_signal(TransportSignal::SetupDeferred {
        reason: "lookup failed".into(),
    });
    assert_eq!(controller.mode(), SourceMode::Connecting);
    clock.advance(Duration::from_millis(1_000));
    controller.fire_due_timers();
    assert_eq!(controller.drain_commands(), vec![Command::Connect]);

    // The connect timeout still bounds the whole attempt.
    clock.set_ms(5_500);
    controller.fire_due_timers();
    assert_eq!(controller.mode(), SourceMode::Polling);
}

#[test]
fn no_fallback_fails_and_retry_reconnects() {
    let config = DashboardConfig {
        poll_fallback: false,
        ..DashboardConfig::default()
    };
    let (mut controller, clock) = started(config);
    clock.advance(Duration::from_millis(5_500));
    controller.fire_due_timers();
    assert_eq!(controller.mode(), SourceMode::Failed);
    assert!(!controller.scheduler().is_armed(TimerKind::Poll));
    controller.drain_commands();

    controller.retry();
    assert_eq!(controller.mode(), SourceMode::Connecting);
    assert_eq!(controller.drain_commands(), vec![Command::Connect]);
    assert!(controller.scheduler().is_armed(TimerKind::ConnectTimeout));

    controller.handle_signal(TransportSignal::HandshakeSucceeded);
    assert_eq!(controller.mode(), SourceMode::Live);
}

#[test]
fn retry_outside_failed_does_nothing() {
    let (mut controller, _clock) = live(DashboardConfig::default());
    let before = controller.buffer().len();
    controller.retry();
    assert_eq!(controller.mode(), SourceMode::Live);
    assert_eq!(controller.buffer().len(), before);
}

#[test]
fn recovery_reconnects_from_polling() {
    let config = DashboardConfig {
        recover_to_live: true,
        ..DashboardConfig::default()
    };
    let (mut controller, clock) = polling(config);
    controller.fire_due_timers();
    controller.drain_commands();

    clock.advance(Duration::from_secs(30));
    let fired = controller.fire_due_timers();
    assert!(fired.contains(&TimerKind::Reconnect));
    assert!(controller.drain_commands().contains(&Command::Connect));

    controller.handle_signal(TransportSignal::HandshakeSucceeded);
    assert_eq!(controller.mode(), SourceMode::Live);
    assert!(!controller.scheduler().is_armed(TimerKind::Poll));
    assert!(!controller.scheduler().is_armed(TimerKind::Reconnect));
    assert_eq!(controller.source_state().last_seen, None);
}

// ─── Polling ────────────────────────────────────────────────────────

#[test]
fn poll_snapshot_replaces_buffer_and_dedups() {
    let (mut controller, _clock) = polling(DashboardConfig::default());
    let snapshot = FeedSnapshot::from(vec![
        ev("c", hms(12, 0, 3)),
        ev("b", hms(12, 0, 2)),
        ev("a", hms(12, 0, 1)),
    ]);

    assert_eq!(controller.handle_poll(snapshot.clone()), SnapshotVerdict::Fresh);
    assert_eq!(messages(&controller), vec!["c", "b", "a"]);
    assert_eq!(controller.source_state().last_seen, Some(hms(12, 0, 3)));

    assert_eq!(controller.handle_poll(snapshot), SnapshotVerdict::Unchanged);
    assert_eq!(
        controller.handle_poll(FeedSnapshot::from(Vec::new())),
        SnapshotVerdict::Empty
    );
    assert_eq!(messages(&controller), vec!["c", "b", "a"]);
}

#[test]
fn poll_snapshot_is_truncated_to_capacity() {
    let config = DashboardConfig {
        capacity: 2,
        ..DashboardConfig::default()
    };
    let (mut controller, _clock) = polling(config);
    let snapshot = FeedSnapshot::from(vec![
        ev("c", hms(12, 0, 3)),
        ev("b", hms(12, 0, 2)),
        ev("a", hms(12, 0, 1)),
    ]);
    controller.handle_poll(snapshot);
    assert_eq!(messages(&controller), vec!["c", "b"]);
}

#[test]
fn poll_snapshot_ignored_while_live() {
    let (mut controller, _clock) = live(DashboardConfig::default());
    let before = messages(&controller);
    let verdict = controller.handle_poll(FeedSnapshot::from(vec![ev("x", hms(12, 1, 0))]));
    assert_eq!(verdict, SnapshotVerdict::NotPolling);
    assert_eq!(messages(&controller), before);
}

#[test]
fn poll_failure_changes_nothing() {
    let (mut controller, _clock) = polling(DashboardConfig::default());
    let before = messages(&controller);
    controller.handle_poll_failure("HTTP 500");
    assert_eq!(controller.mode(), SourceMode::Polling);
    assert_eq!(messages(&controller), before);
}

// ─── Push channel ───────────────────────────────────────────────────

#[test]
fn activity_updates_are_coalesced() {
    let (mut controller, clock) = live(DashboardConfig::default());
    assert!(controller.handle_push(PushMessage::ActivityUpdate(ev("first", noon()))));
    clock.advance(Duration::from_millis(100));
    assert!(!controller.handle_push(PushMessage::ActivityUpdate(ev("second", noon()))));
    clock.advance(Duration::from_millis(500));
    assert!(controller.handle_push(PushMessage::ActivityUpdate(ev("third", noon()))));

    let msgs = messages(&controller);
    assert_eq!(msgs[0], "third");
    assert_eq!(msgs[1], "first");
    assert!(!msgs.contains(&"second".to_string()));
    assert_eq!(controller.coalescer().rejected_total(), 1);
}

#[test]
fn push_ignored_unless_live() {
    let (mut controller, _clock) = polling(DashboardConfig::default());
    let before = messages(&controller);
    assert!(!controller.handle_push(PushMessage::ActivityUpdate(ev("late", noon()))));
    assert!(!controller.handle_push(PushMessage::ScanningStart));
    assert_eq!(messages(&controller), before);
    assert!(!controller.stats().scanning);
}

#[test]
fn initial_state_seeds_gauges_and_feed() {
    let (mut controller, _clock) = live(DashboardConfig::default());
    let state = InitialState {
        pizza_index: 5.5,
        gay_bar_index: Some(4.0),
        active_locations: 12,
        scan_count: 3,
        anomaly_count: 1,
        last_scan_time: Some("11:59:00".into()),
        activity_feed: vec![ev("y", hms(11, 59, 0)), ev("x", hms(11, 58, 0))],
        scanner_running: true,
    };
    controller.handle_push(PushMessage::InitialState(state));

    assert_eq!(messages(&controller), vec!["y", "x", MSG_CONNECTED, MSG_INIT]);
    assert!((controller.gauge(IndexKind::Pizza).value() - 5.5).abs() < f64::EPSILON);
    assert!((controller.gauge(IndexKind::GayBar).value() - 4.0).abs() < f64::EPSILON);
    let stats = controller.stats();
    assert_eq!(stats.scan_count, 3);
    assert_eq!(stats.active_locations, 12);
    assert!(stats.scanner_running);
    assert!(stats.last_scan_ms.is_some());
}

#[test]
fn initial_state_keeps_connect_event_and_evicts_oldest_local() {
    let config = DashboardConfig {
        capacity: 3,
        ..DashboardConfig::default()
    };
    let (mut controller, _clock) = live(config);
    assert_eq!(messages(&controller), vec![MSG_CONNECTED, MSG_INIT]);

    let state = InitialState {
        activity_feed: vec![ev("server item", hms(11, 59, 0))],
        ..InitialState::default()
    };
    controller.handle_push(PushMessage::InitialState(state));
    assert_eq!(
        messages(&controller),
        vec!["server item", MSG_CONNECTED, MSG_INIT]
    );

    let state = InitialState {
        activity_feed: (0..5)
            .map(|i| ev(&format!("s{i}"), hms(11, 50, i)))
            .collect(),
        ..InitialState::default()
    };
    controller.handle_push(PushMessage::InitialState(state));
    assert_eq!(messages(&controller), vec!["s0", "s1", "s2"]);
}

#[test]
fn index_and_scan_updates() {
    let (mut controller, clock) = live(DashboardConfig::default());
    controller.handle_push(PushMessage::PizzaIndexUpdate(IndexUpdate {
        value: 8.2,
        change: 3.0,
        old_value: Some(7.9),
    }));
    assert!(controller.gauge(IndexKind::Pizza).is_anomalous());

    controller.handle_push(PushMessage::ScanningStart);
    assert!(controller.stats().scanning);
    clock.advance(Duration::from_secs(2));
    controller.handle_push(PushMessage::ScanningComplete);
    assert!(!controller.stats().scanning);
    assert_eq!(controller.stats().last_scan_ms, Some(clock.monotonic_ms()));
}

#[test]
fn anomaly_notice_records_event_and_bumps_index() {
    let (mut controller, _clock) = live(DashboardConfig::default());
    controller.handle_push(PushMessage::AnomalyDetected(AnomalyNotice {
        title: "Pizza spike".into(),
        message: "Unusual activity near the Pentagon".into(),
        anomaly_count: None,
    }));

    let newest = controller.buffer().newest().unwrap();
    assert_eq!(newest.category(), &Category::Anomaly);
    assert_eq!(newest.severity(), Severity::Critical);
    assert_eq!(controller.stats().anomaly_count, 1);
    assert!((controller.gauge(IndexKind::Pizza).value() - 4.92).abs() < 1e-9);
    let view = controller.view();
    assert_eq!(view.notice.map(|n| n.severity), Some(Severity::Critical));
}

// ─── Manual scan ────────────────────────────────────────────────────

#[test]
fn manual_scan_requires_live() {
    let (mut controller, _clock) = polling(DashboardConfig::default());
    let before = messages(&controller);
    let err = controller.trigger_manual_scan().unwrap_err();
    assert!(matches!(
        err,
        SignalSliceError::NotConnected {
            mode: SourceMode::Polling
        }
    ));
    assert_eq!(messages(&controller), before);
    assert!(controller.drain_commands().is_empty());
}

#[test]
fn manual_scan_sends_and_records() {
    let (mut controller, _clock) = live(DashboardConfig::default());
    controller.trigger_manual_scan().unwrap();
    assert_eq!(
        controller.drain_commands(),
        vec![Command::Send(OutboundMessage::ManualScan)]
    );
    assert_eq!(messages(&controller)[0], MSG_MANUAL_SCAN);
}

// ─── Invariants ─────────────────────────────────────────────────────

#[test]
fn buffer_never_exceeds_capacity() {
    let config = DashboardConfig {
        capacity: 3,
        ..DashboardConfig::default()
    };
    let (mut controller, clock) = live(config);
    for i in 0..20 {
        clock.advance(Duration::from_millis(600));
        controller.handle_push(PushMessage::ActivityUpdate(ev(&format!("e{i}"), noon())));
        controller.record_local(Category::System, "local", Severity::Normal);
        assert!(controller.buffer().len() <= 3);
    }
}

#[test]
fn dirty_flag_and_shutdown() {
    let (mut controller, clock) = started(DashboardConfig::default());
    assert!(controller.take_dirty());
    assert!(!controller.take_dirty());

    clock.advance(Duration::from_secs(10));
    controller.fire_due_timers();
    assert!(controller.take_dirty());

    controller.shutdown();
    assert_eq!(controller.next_deadline_ms(), None);
    assert!(controller.drain_commands().contains(&Command::Disconnect));
}
