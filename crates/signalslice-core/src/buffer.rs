//! Bounded, order-preserving event buffer.
//!
//! Newest events live at the front. Order is acceptance order, never
//! `occurred_at`, since sources may deliver out of order.

use std::collections::VecDeque;

use crate::error::SignalSliceError;
use crate::types::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventBuffer {
    /// Create an empty buffer. `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Result<Self, SignalSliceError> {
        if capacity == 0 {
            return Err(SignalSliceError::InvalidConfig(
                "event buffer capacity must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            events: VecDeque::with_capacity(capacity + 1),
            capacity,
        })
    }

    /// Prepend `event`, evicting from the tail while over capacity.
    pub fn insert(&mut self, event: Event) {
        self.events.push_front(event);
        while self.events.len() > self.capacity {
            self.events.pop_back();
        }
    }

    /// Replace the whole content with the leading `capacity` items of a
    /// newest-first sequence.
    ///
    /// Goes through [`insert`](Self::insert) oldest-first so the resulting
    /// order matches the input.
    pub fn replace_with<'a, I>(&mut self, newest_first: I)
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let retained: Vec<&Event> = newest_first.into_iter().take(self.capacity).collect();
        self.events.clear();
        for event in retained.into_iter().rev() {
            self.insert(event.clone());
        }
    }

    /// Current content, newest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Event> + '_ {
        self.events.iter()
    }

    pub fn newest(&self) -> Option<&Event> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
