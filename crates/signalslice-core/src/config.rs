//! Dashboard configuration: a plain struct with defaults, loadable from TOML.
//!
//! Durations are stored in milliseconds so TOML files stay flat:
//!
//! ```toml
//! capacity = 15
//! poll_interval_ms = 10000
//! recover_to_live = true
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::arbitrator::{ArbitratorPolicy, DEFAULT_SETUP_RETRY_DELAY_MS};
use crate::error::SignalSliceError;

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_MINIMUM_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CONNECT_DELAY_MS: u64 = 500;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_CLOCK_REFRESH_MS: u64 = 10_000;
pub const DEFAULT_CHART_POINTS: usize = 15;
/// Largest accepted `utc_offset_minutes` magnitude.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// Maximum number of events kept in the activity feed.
    pub capacity: usize,
    /// Minimum spacing between accepted pushed activity updates.
    pub minimum_interval_ms: u64,
    /// Delay before the first push-channel connect attempt.
    pub connect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub setup_retry_delay_ms: u64,
    /// Reconnect attempt period while polling (only with `recover_to_live`).
    pub reconnect_interval_ms: u64,
    pub clock_refresh_ms: u64,
    /// Points kept per index chart series.
    pub chart_points: usize,
    pub poll_fallback: bool,
    pub recover_to_live: bool,
    /// Fixed UTC offset for stamping local events. Unset means the machine's
    /// local zone. The backend stamps its events in US Eastern time, so
    /// `-300` (or `-240` in summer) keeps both on one clock.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            minimum_interval_ms: DEFAULT_MINIMUM_INTERVAL_MS,
            connect_delay_ms: DEFAULT_CONNECT_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            setup_retry_delay_ms: DEFAULT_SETUP_RETRY_DELAY_MS,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            clock_refresh_ms: DEFAULT_CLOCK_REFRESH_MS,
            chart_points: DEFAULT_CHART_POINTS,
            poll_fallback: true,
            recover_to_live: false,
            utc_offset_minutes: None,
        }
    }
}

impl DashboardConfig {
    pub fn from_toml(s: &str) -> Result<Self, SignalSliceError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, SignalSliceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), SignalSliceError> {
        if self.capacity == 0 {
            return Err(invalid("capacity must be >= 1"));
        }
        if self.chart_points == 0 {
            return Err(invalid("chart_points must be >= 1"));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("setup_retry_delay_ms", self.setup_retry_delay_ms),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("clock_refresh_ms", self.clock_refresh_ms),
        ] {
            if value == 0 {
                return Err(invalid(&format!("{name} must be > 0")));
            }
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
                return Err(invalid("utc_offset_minutes must be within +/-1080"));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> ArbitratorPolicy {
        ArbitratorPolicy {
            poll_fallback: self.poll_fallback,
            recover_to_live: self.recover_to_live,
            setup_retry_delay: self.setup_retry_delay(),
        }
    }

    /// Zone for local event stamps, `None` for the machine's local zone.
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
    }

    pub fn minimum_interval(&self) -> Duration {
        Duration::from_millis(self.minimum_interval_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn setup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.setup_retry_delay_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn clock_refresh(&self) -> Duration {
        Duration::from_millis(self.clock_refresh_ms)
    }
}

fn invalid(reason: &str) -> SignalSliceError {
    SignalSliceError::InvalidConfig(reason.to_string())
}
