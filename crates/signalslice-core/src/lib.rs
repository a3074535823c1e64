//! signalslice-core: bounded activity feed, update coalescing and
//! push/poll source arbitration for the SignalSlice dashboard.
//! Pure state: no sockets, no sleeping. Time comes from a [`Clock`].

pub mod arbitrator;
pub mod buffer;
pub mod coalescer;
pub mod config;
pub mod controller;
pub mod error;
pub mod gauges;
pub mod schedule;
pub mod serde_helpers;
pub mod types;

pub use arbitrator::{
    ArbitratorPolicy, Effect, SnapshotVerdict, SourceMode, SourceState, Transition,
    TransportSignal, authorize_manual_action, evaluate_snapshot, transition,
};
pub use buffer::EventBuffer;
pub use coalescer::{Admission, UpdateCoalescer};
pub use config::DashboardConfig;
pub use controller::{Command, DashboardController, DashboardView};
pub use error::SignalSliceError;
pub use gauges::{ChartPoint, IndexGauge, Notice, ScanStats};
pub use schedule::{Clock, ManualClock, Scheduler, SystemClock, TimerKind, TimerTable};
pub use types::{
    AnomalyNotice, Category, Event, FeedSnapshot, IndexKind, IndexUpdate, InitialState,
    OutboundMessage, PushMessage, ScanStatsUpdate, Severity,
};
