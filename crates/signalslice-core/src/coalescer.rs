//! Update coalescer: a drop-excess throttle in front of the event buffer.
//!
//! Events offered within `minimum_interval` of the last accepted one are
//! dropped for good. Nothing is queued, so accepted events keep arrival order.

use std::time::Duration;

use crate::buffer::EventBuffer;
use crate::types::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCoalescer {
    minimum_interval_ms: u64,
    last_accepted_ms: Option<u64>,
    rejected_total: u64,
}

impl UpdateCoalescer {
    pub fn new(minimum_interval: Duration) -> Self {
        Self {
            minimum_interval_ms: u64::try_from(minimum_interval.as_millis()).unwrap_or(u64::MAX),
            last_accepted_ms: None,
            rejected_total: 0,
        }
    }

    /// Offer `event` at monotonic time `now_ms`.
    ///
    /// On acceptance the event is inserted into `buffer`.
    pub fn offer(&mut self, buffer: &mut EventBuffer, event: Event, now_ms: u64) -> Admission {
        if let Some(last) = self.last_accepted_ms {
            if now_ms.saturating_sub(last) < self.minimum_interval_ms {
                self.rejected_total = self.rejected_total.saturating_add(1);
                return Admission::Rejected;
            }
        }
        self.last_accepted_ms = Some(now_ms);
        buffer.insert(event);
        Admission::Accepted
    }

    pub fn minimum_interval(&self) -> Duration {
        Duration::from_millis(self.minimum_interval_ms)
    }

    pub fn last_accepted_ms(&self) -> Option<u64> {
        self.last_accepted_ms
    }

    /// Number of events dropped since construction.
    pub fn rejected_total(&self) -> u64 {
        self.rejected_total
    }
}
