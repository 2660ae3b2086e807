use std::time::{Duration, SystemTime};

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Closed timelike curve, reality compromised")
        .as_secs()
}

/// Wall-clock duration between two unix timestamps, saturating at zero
/// rather than panicking if `earlier` is in the future.
#[inline]
pub fn elapsed_secs(earlier: u64, now: u64) -> Duration {
    Duration::from_secs(now.saturating_sub(earlier))
}
