//! A tiny clock seam so tests can avoid depending on wall-clock time.
//!
//! SPEC_FULL.md §9 records the decision for the "clock jump" open
//! question: we use `SystemTime` (not a monotonic clock — reclone
//! timestamps are persisted and compared across process restarts, where
//! only wall-clock time is meaningful), and treat a negative duration
//! (`now < recorded_time`) as "not yet due" everywhere a TTL is compared,
//! rather than saturating to "due now". A backwards clock jump should
//! never itself trigger a reclone storm.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `now - since`, saturating to zero instead of panicking/wrapping when
/// `since` is in the future (a clock jump backwards, or a timestamp
/// seeded at "now" that raced past `now` by a few milliseconds of
/// integer-second rounding). Per the decision above, "not yet due" is the
/// correct reading of a negative age, so zero (never overdue) is the
/// right saturating value.
pub fn age_secs(now: u64, since: u64) -> u64 {
    now.saturating_sub(since)
}
