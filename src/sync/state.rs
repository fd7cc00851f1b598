//! In-memory debounce and echo-suppression state
//!
//! One instance is shared by every invocation of an engine (scheduler ticks and
//! file events alike). Nothing here is persisted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::device::Side;

#[derive(Debug, Default)]
struct Inner {
    /// playlist name -> last time it was processed
    processed: HashMap<String, Instant>,
    /// device -> playlist name -> (time of our write, window its events are ignored)
    pushed: HashMap<Side, HashMap<String, (Instant, Duration)>>,
}

/// Recently-processed and recently-pushed maps behind a single lock
#[derive(Debug, Default)]
pub struct SyncState {
    inner: Mutex<Inner>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debounce check-and-set.
    ///
    /// Returns `false` when `name` was processed less than `delay` ago.
    /// Otherwise records now as its last processing time and returns `true`.
    /// Two racing callers for the same name cannot both pass.
    pub fn try_begin(&self, name: &str, delay: Duration) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();

        if let Some(last) = inner.processed.get(name) {
            if now.duration_since(*last) < delay {
                return false;
            }
        }

        inner.processed.insert(name.to_string(), now);
        true
    }

    /// Read-only debounce check: whether `name` was processed less than `delay` ago
    pub fn is_debounced(&self, name: &str, delay: Duration) -> bool {
        self.lock()
            .processed
            .get(name)
            .is_some_and(|last| last.elapsed() < delay)
    }

    /// Time since `name` was last processed, if ever
    pub fn since_processed(&self, name: &str) -> Option<Duration> {
        self.lock()
            .processed
            .get(name)
            .map(|last| last.elapsed())
    }

    pub fn mark_processed(&self, name: &str) {
        self.lock().processed.insert(name.to_string(), Instant::now());
    }

    /// Whether an event for `name` on `side` is the echo of our own write
    pub fn is_echo(&self, side: Side, name: &str) -> bool {
        let mut inner = self.lock();

        let Some(device) = inner.pushed.get_mut(&side) else {
            return false;
        };
        match device.get(name).copied() {
            Some((at, block)) if at.elapsed() < block => true,
            Some(_) => {
                device.remove(name);
                false
            }
            None => false,
        }
    }

    /// Record a write of `name` to `side`, blocking its events for `block`
    pub fn record_push(&self, side: Side, name: &str, block: Duration) {
        self.lock()
            .pushed
            .entry(side)
            .or_default()
            .insert(name.to_string(), (Instant::now(), block));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
