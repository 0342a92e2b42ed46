//! Per-client token bucket gating inbound frames.

use std::time::Instant;

/// A token bucket refilled at `rate` tokens/second up to `burst`.
///
/// Refill uses the monotonic clock, so wall-clock jumps neither grant free
/// tokens nor freeze the bucket.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    rate: f64,
    burst: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket. `burst` is also the starting balance.
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            rate,
            burst,
            last_refill: Instant::now(),
        }
    }

    /// Refill from elapsed monotonic time, then take one token.
    /// Returns `false` when the bucket is empty; the frame must be dropped.
    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    fn try_consume_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
