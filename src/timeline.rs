//! Append-only event timeline for a single supervised run
//!
//! Records process start, every line of child output, and process end with the
//! instant it was observed. The stdout and stderr drain threads append
//! concurrently, so appends are serialized behind a mutex: a plain `Vec` shared
//! between the two drains would be a data race.
//!
//! Ordering: events are kept in append order. Within one stream that matches
//! read order; across stdout and stderr the interleaving is only approximate.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// What kind of occurrence an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Recorded just before the child is spawned
    Start,
    /// One line read from the child's stdout or stderr
    Output,
    /// Recorded after the child has been reaped
    End,
}

/// A single timestamped occurrence. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Instant,
    pub kind: EventKind,
    pub message: String,
}

impl Event {
    pub fn new(timestamp: Instant, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            message: message.into(),
        }
    }
}

/// Thread-safe ordered log of [`Event`]s
///
/// Append-only: there is no removal API.
///
/// # Example
/// ```
/// use whyismybuildslow::timeline::{EventKind, Timeline};
///
/// let timeline = Timeline::new();
/// timeline.record(EventKind::Start, "build started");
/// timeline.record(EventKind::Output, "Compiling foo v0.1.0");
///
/// let events = timeline.snapshot();
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[1].message, "Compiling foo v0.1.0");
/// ```
#[derive(Debug, Default)]
pub struct Timeline {
    events: Mutex<Vec<Event>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event stamped with the current instant
    ///
    /// The instant is read while holding the lock, so timestamps never go
    /// backwards in append order.
    pub fn record(&self, kind: EventKind, message: impl Into<String>) {
        let message = message.into();
        let mut events = self.lock();
        events.push(Event::new(Instant::now(), kind, message));
    }

    /// Append a pre-built event with a caller-supplied timestamp
    pub fn push(&self, event: Event) {
        self.lock().push(event);
    }

    /// Copy of the events in append order
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Consume the timeline once all writers are gone
    pub fn into_events(self) -> Vec<Event> {
        self.events
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // A panicking writer cannot leave a half-written entry behind (push is the
    // only mutation), so a poisoned lock is still safe to keep using.
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl From<Vec<Event>> for Timeline {
    fn from(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }
}
