use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::SignalSliceError;
use crate::serde_helpers::source_time;

// ─── Category ─────────────────────────────────────────────────────

/// Event category tag. Open-ended: unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Init,
    Connect,
    Disconnect,
    Error,
    Fallback,
    Anomaly,
    Scan,
    Manual,
    System,
    Update,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "INIT",
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Error => "ERROR",
            Self::Fallback => "FALLBACK",
            Self::Anomaly => "ANOMALY",
            Self::Scan => "SCAN",
            Self::Manual => "MANUAL",
            Self::System => "SYSTEM",
            Self::Update => "UPDATE",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for Category {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "INIT" => Self::Init,
            "CONNECT" => Self::Connect,
            "DISCONNECT" => Self::Disconnect,
            "ERROR" => Self::Error,
            "FALLBACK" => Self::Fallback,
            "ANOMALY" => Self::Anomaly,
            "SCAN" => Self::Scan,
            "MANUAL" => Self::Manual,
            "SYSTEM" => Self::System,
            "UPDATE" => Self::Update,
            _ => Self::Other(tag),
        }
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Severity ─────────────────────────────────────────────────────

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Success,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Self; 4] = [Self::Normal, Self::Success, Self::Warning, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Unknown levels fall back to `Normal`.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "warning" => Self::Warning,
            "critical" => Self::Critical,
            _ => Self::Normal,
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lossy(&raw))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Event ────────────────────────────────────────────────────────

/// One user-visible occurrence. Immutable once constructed.
///
/// Field names on the wire follow the backend (`type`, `level`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    category: Category,
    message: String,
    #[serde(rename = "level", default)]
    severity: Severity,
    #[serde(rename = "timestamp", with = "source_time")]
    occurred_at: NaiveTime,
}

impl Event {
    pub fn new(
        category: Category,
        message: impl Into<String>,
        severity: Severity,
        occurred_at: NaiveTime,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            severity,
            occurred_at,
        }
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Time of day on the source clock.
    pub fn occurred_at(&self) -> NaiveTime {
        self.occurred_at
    }
}

// ─── Indices ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Pizza,
    GayBar,
}

impl IndexKind {
    pub const ALL: [Self; 2] = [Self::Pizza, Self::GayBar];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pizza => "Pizza Index",
            Self::GayBar => "Gay Bar Index",
        }
    }

    /// Value shown before the backend has reported anything.
    pub fn baseline(self) -> f64 {
        match self {
            Self::Pizza => 3.42,
            Self::GayBar => 6.58,
        }
    }
}

// ─── Push channel messages ────────────────────────────────────────

/// Full dashboard state sent by the backend right after the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    pub pizza_index: f64,
    pub gay_bar_index: Option<f64>,
    pub active_locations: u32,
    pub scan_count: u64,
    pub anomaly_count: u64,
    /// `HH:MM:SS` or `"Never"`.
    pub last_scan_time: Option<String>,
    pub activity_feed: Vec<Event>,
    pub scanner_running: bool,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            pizza_index: IndexKind::Pizza.baseline(),
            gay_bar_index: None,
            active_locations: 0,
            scan_count: 0,
            anomaly_count: 0,
            last_scan_time: None,
            activity_feed: Vec::new(),
            scanner_running: false,
        }
    }
}

impl InitialState {
    /// Whether the backend has completed at least one scan.
    pub fn has_scanned(&self) -> bool {
        self.last_scan_time
            .as_deref()
            .is_some_and(|t| !t.is_empty() && t != "Never")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexUpdate {
    pub value: f64,
    /// Change in percent relative to `old_value`.
    #[serde(default)]
    pub change: f64,
    #[serde(default)]
    pub old_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatsUpdate {
    pub scan_count: u64,
    #[serde(default)]
    pub last_scan_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyNotice {
    #[serde(default)]
    pub title: String,
    pub message: String,
    /// Total anomaly count after this one; absent means "previous + 1".
    #[serde(default)]
    pub anomaly_count: Option<u64>,
}

/// Named message delivered over the push channel:
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    InitialState(InitialState),
    ActivityUpdate(Event),
    PizzaIndexUpdate(IndexUpdate),
    GayBarIndexUpdate(IndexUpdate),
    ScanStatsUpdate(ScanStatsUpdate),
    AnomalyDetected(AnomalyNotice),
    ScanningStart,
    ScanningComplete,
}

impl PushMessage {
    pub fn from_json(text: &str) -> Result<Self, SignalSliceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialState(_) => "initial_state",
            Self::ActivityUpdate(_) => "activity_update",
            Self::PizzaIndexUpdate(_) => "pizza_index_update",
            Self::GayBarIndexUpdate(_) => "gay_bar_index_update",
            Self::ScanStatsUpdate(_) => "scan_stats_update",
            Self::AnomalyDetected(_) => "anomaly_detected",
            Self::ScanningStart => "scanning_start",
            Self::ScanningComplete => "scanning_complete",
        }
    }
}

/// Client-to-backend message. Fire-and-forget, no acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage {
    ManualScan,
}

impl OutboundMessage {
    pub fn name(self) -> &'static str {
        match self {
            Self::ManualScan => "manual_scan",
        }
    }

    pub fn to_json(self) -> String {
        serde_json::json!({ "event": self.name() }).to_string()
    }
}

// ─── Poll snapshot ────────────────────────────────────────────────

/// Polling endpoint response: recent events, newest first.
///
/// Accepts both `{"activity_feed": [...], "timestamp": ...}` and a bare array.
/// Items that fail to decode are skipped with a warning; the rest of the
/// snapshot is kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawFeedSnapshot")]
pub enum FeedSnapshot {
    Wrapped {
        activity_feed: Vec<Event>,
        timestamp: Option<String>,
    },
    Bare(Vec<Event>),
}

/// Wire shape before item decoding.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFeedSnapshot {
    Wrapped {
        activity_feed: Vec<serde_json::Value>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Bare(Vec<serde_json::Value>),
}

impl From<RawFeedSnapshot> for FeedSnapshot {
    fn from(raw: RawFeedSnapshot) -> Self {
        match raw {
            RawFeedSnapshot::Wrapped {
                activity_feed,
                timestamp,
            } => Self::Wrapped {
                activity_feed: decode_feed_items(activity_feed),
                timestamp,
            },
            RawFeedSnapshot::Bare(items) => Self::Bare(decode_feed_items(items)),
        }
    }
}

fn decode_feed_items(items: Vec<serde_json::Value>) -> Vec<Event> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<Event>(item) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping undecodable feed item");
                None
            }
        })
        .collect()
}

impl FeedSnapshot {
    pub fn from_json(text: &str) -> Result<Self, SignalSliceError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let shaped = match &value {
            serde_json::Value::Array(_) => true,
            serde_json::Value::Object(map) => {
                matches!(map.get("activity_feed"), Some(serde_json::Value::Array(_)))
            }
            _ => false,
        };
        if !shaped {
            return Err(SignalSliceError::MalformedMessage(
                <serde_json::Error as serde::de::Error>::custom(
                    "expected an `activity_feed` array or a bare array of events",
                ),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn events(&self) -> &[Event] {
        match self {
            Self::Wrapped { activity_feed, .. } => activity_feed,
            Self::Bare(events) => events,
        }
    }

    pub fn into_events(self) -> Vec<Event> {
        match self {
            Self::Wrapped { activity_feed, .. } => activity_feed,
            Self::Bare(events) => events,
        }
    }
}

impl From<Vec<Event>> for FeedSnapshot {
    fn from(events: Vec<Event>) -> Self {
        Self::Bare(events)
    }
}
