//! Index gauges and scan statistics shown next to the activity feed.

use std::collections::VecDeque;

use chrono::NaiveTime;
use serde::Serialize;

use crate::types::{IndexKind, IndexUpdate, Severity};

/// Change (percent) above which an index update is flagged anomalous.
pub const ANOMALY_CHANGE_PERCENT: f64 = 10.0;

/// Index value above which an update is flagged anomalous.
pub const ANOMALY_VALUE: f64 = 7.0;

/// Amount an anomaly notice bumps the pizza index by.
pub const ANOMALY_BUMP: f64 = 1.5;

pub const INDEX_CEILING: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub at: NaiveTime,
    pub value: f64,
    pub anomalous: bool,
}

/// One tracked index plus its bounded chart series (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexGauge {
    kind: IndexKind,
    value: f64,
    change_percent: Option<f64>,
    anomalous: bool,
    history: VecDeque<ChartPoint>,
    history_limit: usize,
}

impl IndexGauge {
    pub fn new(kind: IndexKind, history_limit: usize) -> Self {
        Self {
            kind,
            value: kind.baseline(),
            change_percent: None,
            anomalous: false,
            history: VecDeque::with_capacity(history_limit),
            history_limit: history_limit.max(1),
        }
    }

    /// Apply a backend update.
    pub fn apply(&mut self, update: &IndexUpdate, at: NaiveTime) {
        let anomalous = update.change > ANOMALY_CHANGE_PERCENT || update.value > ANOMALY_VALUE;
        self.set(update.value, Some(update.change), anomalous, at);
    }

    /// Set the value without a change figure (initial state).
    pub fn reset(&mut self, value: f64, at: NaiveTime) {
        self.set(value, None, false, at);
    }

    /// Raise the index after an anomaly notice when it is still below the
    /// anomaly threshold. Returns whether the gauge moved.
    pub fn bump_for_anomaly(&mut self, at: NaiveTime) -> bool {
        if self.value >= ANOMALY_VALUE {
            return false;
        }
        let bumped = (self.value + ANOMALY_BUMP).min(INDEX_CEILING);
        let change = if self.value.abs() > f64::EPSILON {
            (bumped - self.value) / self.value * 100.0
        } else {
            0.0
        };
        self.set(bumped, Some(change), true, at);
        true
    }

    fn set(&mut self, value: f64, change_percent: Option<f64>, anomalous: bool, at: NaiveTime) {
        self.value = value;
        self.change_percent = change_percent;
        self.anomalous = anomalous;
        self.history.push_back(ChartPoint {
            at,
            value,
            anomalous,
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn change_percent(&self) -> Option<f64> {
        self.change_percent
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomalous
    }

    pub fn history(&self) -> impl ExactSizeIterator<Item = &ChartPoint> + '_ {
        self.history.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub scan_count: u64,
    pub anomaly_count: u64,
    pub active_locations: u32,
    /// Monotonic time of the last completed scan.
    pub last_scan_ms: Option<u64>,
    pub scanning: bool,
    pub scanner_running: bool,
}

impl ScanStats {
    /// Whole minutes since the last completed scan.
    pub fn minutes_since_scan(&self, now_ms: u64) -> Option<u64> {
        self.last_scan_ms
            .map(|at| now_ms.saturating_sub(at) / 60_000)
    }
}

/// Short-lived toast shown by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
    pub raised_ms: u64,
}
