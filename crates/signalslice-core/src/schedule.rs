//! Clock and timer abstractions.
//!
//! The controller never reads the system clock or sleeps. It asks a [`Clock`]
//! for the time and a [`Scheduler`] for deadlines, so tests can drive it with
//! [`ManualClock`] and virtual time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{FixedOffset, NaiveTime, TimeDelta, Utc};

// ─── Clock ──────────────────────────────────────────────────────────

pub trait Clock {
    /// Milliseconds on a monotonic clock with an arbitrary origin.
    fn monotonic_ms(&self) -> u64;

    /// Local time of day, used to stamp locally originated events.
    fn wall_time(&self) -> NaiveTime;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    /// `None` reads the machine's local zone.
    offset: Option<FixedOffset>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: None,
        }
    }

    /// Stamp wall time in a fixed UTC offset instead of the local zone.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Instant that `monotonic_ms() == 0` refers to.
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn wall_time(&self) -> NaiveTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).time(),
            None => chrono::Local::now().time(),
        }
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
    wall_origin: NaiveTime,
}

impl ManualClock {
    pub fn new(wall_origin: NaiveTime) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(0)),
            wall_origin,
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn wall_time(&self) -> NaiveTime {
        let elapsed = i64::try_from(self.monotonic_ms()).unwrap_or(i64::MAX);
        self.wall_origin + TimeDelta::milliseconds(elapsed)
    }
}

// ─── Timers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Next push-channel connect attempt (initial delay or setup retry).
    ConnectRetry,
    /// Bound on how long `CONNECTING` may last.
    ConnectTimeout,
    /// Periodic snapshot fetch while polling.
    Poll,
    /// Periodic reconnect attempt while polling (opt-in recovery).
    Reconnect,
    /// Periodic header clock refresh.
    ClockRefresh,
}

pub trait Scheduler {
    /// Arm `timer` to fire at `at_ms`, then every `every` if given.
    /// Re-arming replaces any previous deadline.
    fn arm(&mut self, timer: TimerKind, at_ms: u64, every: Option<Duration>);

    fn disarm(&mut self, timer: TimerKind);

    fn is_armed(&self, timer: TimerKind) -> bool;

    /// Earliest pending deadline.
    fn next_deadline(&self) -> Option<u64>;

    /// Remove and return every timer due at `now_ms`, earliest first.
    /// Periodic timers are re-armed.
    fn pop_due(&mut self, now_ms: u64) -> Vec<TimerKind>;

    fn disarm_all(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    at_ms: u64,
    every_ms: Option<u64>,
}

/// In-memory timer table.
#[derive(Debug, Clone, Default)]
pub struct TimerTable {
    deadlines: HashMap<TimerKind, Deadline>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline_of(&self, timer: TimerKind) -> Option<u64> {
        self.deadlines.get(&timer).map(|d| d.at_ms)
    }
}

impl Scheduler for TimerTable {
    fn arm(&mut self, timer: TimerKind, at_ms: u64, every: Option<Duration>) {
        let every_ms = every
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .filter(|ms| *ms > 0);
        self.deadlines.insert(timer, Deadline { at_ms, every_ms });
    }

    fn disarm(&mut self, timer: TimerKind) {
        self.deadlines.remove(&timer);
    }

    fn is_armed(&self, timer: TimerKind) -> bool {
        self.deadlines.contains_key(&timer)
    }

    fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().map(|d| d.at_ms).min()
    }

    fn pop_due(&mut self, now_ms: u64) -> Vec<TimerKind> {
        let mut due: Vec<(u64, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, d)| d.at_ms <= now_ms)
            .map(|(kind, d)| (d.at_ms, *kind))
            .collect();
        due.sort_unstable();

        for (_, kind) in &due {
            let Some(deadline) = self.deadlines.get(kind).copied() else {
                continue;
            };
            match deadline.every_ms {
                Some(every) => {
                    // No catch-up burst after a stall: skip missed periods.
                    let mut next = deadline.at_ms.saturating_add(every);
                    if next <= now_ms {
                        next = now_ms.saturating_add(every);
                    }
                    self.deadlines.insert(
                        *kind,
                        Deadline {
                            at_ms: next,
                            every_ms: Some(every),
                        },
                    );
                }
                None => {
                    self.deadlines.remove(kind);
                }
            }
        }

        due.into_iter().map(|(_, kind)| kind).collect()
    }

    fn disarm_all(&mut self) {
        self.deadlines.clear();
    }
}
