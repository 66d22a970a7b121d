//! Admission control primitives.
//!
//! - [`TokenBucket`]: continuous-refill bucket counting requests
//! - [`OutputRateLimiter`]: byte budget per 60 second window
//!
//! Both are lazily evaluated on access (no background timer) and guard their
//! state with their own mutex, so the two never contend with each other.
//! Time comes from `tokio::time::Instant`, which is monotonic and can be
//! paused in tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Length of the output accounting window
pub const OUTPUT_WINDOW: Duration = Duration::from_secs(60);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket rate limiter.
///
/// Holds at most `capacity` tokens and refills at `capacity / window`
/// tokens per second. A capacity of zero denies every call.
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket admitting `capacity` calls per `window`
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = f64::from(capacity);
        let window_secs = window.as_secs_f64();
        let refill_per_second = if window_secs > 0.0 {
            capacity / window_secs
        } else {
            0.0
        };

        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket sized for a per-minute rate
    pub fn per_minute(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(60))
    }

    /// Take one token if available. Never blocks on time.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        // State is two plain numbers; a poisoned guard still holds valid values.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);

        if state.tokens < 1.0 {
            return false;
        }

        state.tokens -= 1.0;
        true
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Tokens currently in the bucket (without refilling)
    pub fn available(&self) -> f64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).tokens
    }
}

struct WindowState {
    window_start: Instant,
    bytes_sent: u64,
}

/// Byte-volume limiter over a resetting 60 second window
pub struct OutputRateLimiter {
    max_bytes: u64,
    state: Mutex<WindowState>,
}

impl OutputRateLimiter {
    pub fn new(max_bytes_per_minute: u64) -> Self {
        Self {
            max_bytes: max_bytes_per_minute,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                bytes_sent: 0,
            }),
        }
    }

    /// Account `size` bytes against the current window.
    ///
    /// Returns false, without recording anything, if the bytes would not fit.
    pub fn check_output_rate(&self, size: usize) -> bool {
        self.check_at(size as u64, Instant::now())
    }

    fn check_at(&self, size: u64, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now.saturating_duration_since(state.window_start) > OUTPUT_WINDOW {
            state.window_start = now;
            state.bytes_sent = 0;
        }

        if state.bytes_sent.saturating_add(size) > self.max_bytes {
            return false;
        }

        state.bytes_sent += size;
        true
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_capacity_then_deny() {
        let bucket = TokenBucket::per_minute(3);
        let now = Instant::now();

        assert!(bucket.allow_at(now));
        assert!(bucket.allow_at(now));
        assert!(bucket.allow_at(now));
        assert!(!bucket.allow_at(now));
    }

    #[test]
    fn test_zero_rate_always_denies() {
        let bucket = TokenBucket::per_minute(0);
        let start = Instant::now();

        for secs in [0, 1, 60, 3600] {
            assert!(!bucket.allow_at(start + Duration::from_secs(secs)));
        }
        assert_eq!(bucket.available(), 0.0);
    }

    #[test]
    fn test_full_refill_within_one_window() {
        let bucket = TokenBucket::per_minute(2);
        let start = Instant::now();

        assert!(bucket.allow_at(start));
        assert!(bucket.allow_at(start));
        assert!(!bucket.allow_at(start));

        let later = start + Duration::from_secs(60);
        assert!(bucket.allow_at(later));
        assert!(bucket.allow_at(later));
        assert!(!bucket.allow_at(later));
    }

    #[test]
    fn test_refill_is_proportional() {
        let bucket = TokenBucket::per_minute(60);
        let start = Instant::now();
        for _ in 0..60 {
            assert!(bucket.allow_at(start));
        }
        assert!(!bucket.allow_at(start));

        // One token per second at 60/min
        assert!(bucket.allow_at(start + Duration::from_millis(1000)));
        assert!(!bucket.allow_at(start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_denied_call_does_not_consume() {
        let bucket = TokenBucket::per_minute(60);
        let start = Instant::now();
        for _ in 0..60 {
            bucket.allow_at(start);
        }
        let half = start + Duration::from_millis(500);
        assert!(!bucket.allow_at(half));
        // the half token kept accruing despite the denial
        assert!(bucket.allow_at(start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_tokens_never_exceed_capacity() {
        let bucket = TokenBucket::per_minute(5);
        let start = Instant::now();
        bucket.allow_at(start + Duration::from_secs(3600));
        assert!(bucket.available() <= 5.0);
    }

    #[test]
    fn test_output_window_accumulates_then_rejects() {
        let start = Instant::now();
        let limiter = OutputRateLimiter::new(100);

        assert!(limiter.check_at(60, start));
        assert!(limiter.check_at(40, start));
        assert!(!limiter.check_at(1, start));
    }

    #[test]
    fn test_output_window_resets_after_sixty_seconds() {
        let start = Instant::now();
        let limiter = OutputRateLimiter::new(100);

        assert!(limiter.check_at(99, start));
        assert!(!limiter.check_at(99, start + Duration::from_secs(60)));
        assert!(limiter.check_at(99, start + Duration::from_secs(61)));
    }

    #[test]
    fn test_rejected_output_is_not_recorded() {
        let start = Instant::now();
        let limiter = OutputRateLimiter::new(100);

        assert!(!limiter.check_at(150, start));
        assert!(limiter.check_at(100, start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_public_api_follows_paused_clock() {
        let bucket = TokenBucket::per_minute(1);
        let limiter = OutputRateLimiter::new(10);

        assert!(bucket.allow());
        assert!(!bucket.allow());
        assert!(limiter.check_output_rate(10));
        assert!(!limiter.check_output_rate(1));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(bucket.allow());
        assert!(limiter.check_output_rate(10));
    }

    proptest! {
        #[test]
        fn prop_at_most_capacity_without_elapsed_time(capacity in 0u32..200, calls in 0usize..400) {
            let bucket = TokenBucket::per_minute(capacity);
            let now = Instant::now();
            let admitted = (0..calls).filter(|_| bucket.allow_at(now)).count();
            prop_assert_eq!(admitted, calls.min(capacity as usize));
        }
    }
}
