//! Supersession and debounce for background requests.
//!
//! Every new request of a kind bumps that kind's [`Generation`]. The worker
//! carries a [`Ticket`]; once a newer ticket exists the older one reports
//! `is_current() == false` and its result is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::clock::Clock;

#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// New ticket; every earlier ticket stops being current.
    pub fn issue(&self) -> Ticket {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        Ticket {
            generation,
            current: Arc::clone(&self.current),
        }
    }

    /// Invalidate outstanding tickets without issuing a new one.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

/// The search in flight, if any.
#[derive(Debug, Clone)]
pub struct PendingSearch {
    pub query: String,
    pub ticket: Ticket,
}

/// Suppresses a repeat of the same key inside `window`.
#[derive(Debug)]
pub struct Debouncer<K> {
    window: Duration,
    clock: Arc<dyn Clock>,
    last: Option<(K, Instant)>,
}

impl<K: PartialEq> Debouncer<K> {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            last: None,
        }
    }

    /// True if `key` should fire now; records it when it does.
    pub fn should_fire(&mut self, key: K) -> bool {
        let now = self.clock.now();
        if let Some((last_key, at)) = &self.last
            && *last_key == key
            && now.saturating_duration_since(*at) < self.window
        {
            return false;
        }
        self.last = Some((key, now));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
