use std::sync::atomic::{AtomicU64, Ordering};

// Milliseconds since the unix epoch
pub type Timestamp = u64;

/// Single source of "now" for every expiry decision in the guard.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // pre-epoch clocks are clamped rather than wrapped
        chrono::Utc::now().timestamp_millis().max(0) as Timestamp
    }
}

/// Clock that only moves when told to. Used by tests and by hosts that
/// drive time from their own event loop.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
