use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Maximum number of events retained in the ring buffer.
const EVENT_LOG_CAPACITY: usize = 200;

/// A typed event from the capture/render pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    CaptureTick {
        full: bool,
        sources_run: u32,
        records_found: u32,
    },
    SourceFailed {
        source: String,
        message: String,
    },
    Selected {
        source: String,
        artist: String,
        title: String,
    },
    SessionReplaced {
        generation: u64,
        has_session: bool,
    },
    Rendered {
        text: String,
    },
    RenderFailed {
        message: String,
    },
    ThumbnailUpdated {
        path: Option<String>,
    },
    NativeInitFailed {
        message: String,
    },
}

/// A timestamped event entry.
pub type EventEntry = (DateTime<Utc>, DebugEvent);

/// Bounded ring buffer of debug events.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Push a new event, evicting the oldest if at capacity.
    pub fn push(&mut self, event: DebugEvent) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((Utc::now(), event));
    }

    /// Return a snapshot of all entries (newest last).
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Thread-safe handle to the event log.
pub type SharedEventLog = Arc<Mutex<EventLog>>;

/// Create a new shared event log.
pub fn shared_event_log() -> SharedEventLog {
    Arc::new(Mutex::new(EventLog::new()))
}

/// Push onto a shared log. A poisoned lock drops the event.
pub fn record(log: &SharedEventLog, event: DebugEvent) {
    if let Ok(mut log) = log.lock() {
        log.push(event);
    }
}
