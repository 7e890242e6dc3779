//! Coalescing of rapid-fire intents.

use std::time::{Duration, Instant};

/// Keeps only the latest intent submitted within a window.
///
/// The deadline is fixed by the first intent of a burst, so a continuous
/// stream of submissions is still released once per window instead of being
/// postponed forever.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    /// Create an empty debouncer releasing intents `window` after the first.
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Queue `intent`, replacing any pending one.
    ///
    /// Returns `true` if a pending intent was dropped.
    pub fn submit(&mut self, intent: T, now: Instant) -> bool {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
        self.pending.replace(intent).is_some()
    }

    /// Take the pending intent if its window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => None,
        }
    }

    /// Take the pending intent regardless of the window.
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    /// When the pending intent becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether an intent is waiting to be released.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending intent without releasing it.
    pub fn clear(&mut self) {
        self.deadline = None;
        self.pending = None;
    }
}
