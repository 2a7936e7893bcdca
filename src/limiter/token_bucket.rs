//! Token bucket with continuous, fractional refill.
//!
//! Tokens accrue as `elapsed * refill_rate` on every check, so a slow rate still
//! makes progress between calls (0.1/s over a 3s gap yields 0.3 tokens).
//! Every event costs exactly one token.

use std::time::{Duration, Instant};

/// Float slack on top of one clock tick of refill
const TOKEN_EPSILON: f64 = 1e-9;

/// Per-client quota state
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Current number of tokens, `0.0..=capacity`
    tokens: f64,

    /// Maximum tokens in the bucket (burst size)
    capacity: f64,

    /// Tokens granted per second
    refill_rate: f64,

    /// Monotonic clock reading of the last refill
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
        }
    }

    /// Refill from elapsed time, then take one token if available.
    ///
    /// On rejection the (already refilled) token count is left as is.
    #[inline]
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.has_whole_token() {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// A refill period waited in whole nanoseconds can fall short of a token
    /// by less than one nanosecond of accrual; count that as a whole token.
    #[inline]
    fn has_whole_token(&self) -> bool {
        self.tokens >= 1.0 - (self.refill_rate * 1e-9 + TOKEN_EPSILON)
    }

    #[inline]
    fn refill(&mut self, now: Instant) {
        // Readings older than last_refill (racing callers) add nothing and keep the clock
        let Some(elapsed) = now.checked_duration_since(self.last_refill) else {
            return;
        };
        self.tokens = self
            .capacity
            .min(self.tokens + elapsed.as_secs_f64() * self.refill_rate);
        self.last_refill = now;
    }

    /// Tokens as of the last refill
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Time until one whole token is available, measured from the last refill.
    ///
    /// Rounded up to the next nanosecond, so waiting exactly this long always
    /// yields a token.
    pub fn time_until_available(&self) -> Duration {
        if self.has_whole_token() {
            return Duration::ZERO;
        }
        let secs = (1.0 - self.tokens) / self.refill_rate;
        let nanos = (secs * 1e9).ceil();
        if nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        }
    }
}
