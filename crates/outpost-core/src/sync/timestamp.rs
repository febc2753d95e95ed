//! Monotonic server timestamps for `updated_at`

use std::sync::atomic::{AtomicI64, Ordering};

/// Issues Unix-millisecond timestamps that strictly increase, even when the
/// wall clock stalls or steps backwards.
#[derive(Debug)]
pub struct Timestamper {
    last: AtomicI64,
}

impl Timestamper {
    /// Start above `floor`, normally the highest timestamp already stored
    pub const fn new(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Next timestamp: wall clock, or one past the previous one if that is later
    pub fn issue(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let next = |last: i64| now.max(last.saturating_add(1));
        let (Ok(previous) | Err(previous)) = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)));
        next(previous)
    }

    /// Raise the high-water mark to a timestamp the store committed
    pub fn observe(&self, committed: i64) {
        self.last.fetch_max(committed, Ordering::SeqCst);
    }

    /// Highest timestamp issued or observed so far
    pub fn high_water(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}
