use std::collections::VecDeque;

use super::event::LogEvent;

/// Default number of retained log lines
pub const DEFAULT_MAX_LOG_LINES: usize = 2000;

/// Bounded log buffer with FIFO eviction
///
/// Holds the most recent `capacity` events in arrival order.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEvent>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogBuffer {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_LOG_LINES)),
            capacity,
        }
    }

    /// Appends an event, returning the evicted oldest event if the buffer was full
    pub fn push(&mut self, event: LogEvent) -> Option<LogEvent> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(event);
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.entries.iter()
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.entries.iter().cloned().collect()
    }
}
