//! Fixed-window request counters keyed by arbitrary strings.
//!
//! A window opens on the first request for a key and lasts `window_ms`.
//! Up to `max_requests` are admitted inside it; once `now >= window_end`
//! the entry is replaced, never incremented. Bursts of up to twice the
//! limit across a window boundary are a known property of fixed windows.

use dashmap::DashMap;
use std::sync::Arc;

use crate::clock::{Clock, Timestamp};
use crate::error::GuardError;

/// Immutable limit for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    max_requests: u32,
    window_ms: u64,
}

impl GuardPolicy {
    pub fn configure(max_requests: u32, window_ms: u64) -> Result<Self, GuardError> {
        if max_requests == 0 || window_ms == 0 {
            return Err(GuardError::InvalidPolicy {
                max_requests,
                window_ms,
            });
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

// Counter for one key - tracks requests inside the current window
#[derive(Debug, Clone)]
pub struct CounterEntry {
    pub count: u32,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
}

impl CounterEntry {
    fn open(now: Timestamp, policy: &GuardPolicy) -> Self {
        Self {
            count: 0,
            window_start: now,
            window_end: now.saturating_add(policy.window_ms),
        }
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.window_end <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Timestamp,
}

pub struct CounterStore {
    clock: Arc<dyn Clock>,
    entries: DashMap<String, CounterEntry>,
}

impl CounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Admit or deny one request for `key` under `policy`.
    ///
    /// The shard lock for `key` is held for the whole read-modify-write, so
    /// two concurrent checks can never both take the last slot.
    pub fn check(&self, policy: &GuardPolicy, key: &str) -> CheckOutcome {
        let now = self.clock.now();

        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| CounterEntry::open(now, policy));

        // window over? start a new one
        if entry.is_expired(now) {
            *entry = CounterEntry::open(now, policy);
        }

        if entry.count < policy.max_requests {
            entry.count += 1;
            return CheckOutcome {
                allowed: true,
                remaining: policy.max_requests - entry.count,
                reset_at: entry.window_end,
            };
        }

        CheckOutcome {
            allowed: false,
            remaining: 0,
            reset_at: entry.window_end,
        }
    }

    // Administrative unblock
    pub fn reset(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry whose window has ended. Only bounds memory; `check`
    /// is correct without it. `retain` locks one shard at a time.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
