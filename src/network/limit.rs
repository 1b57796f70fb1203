//! Inbound flood protection.
//!
//! Each connection owns a governor token bucket. Every inbound frame costs one
//! cell; a frame arriving on an empty bucket is a violation. Consecutive
//! violations past the limit mean the client should be disconnected.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

/// Consecutive violations after which a connection is closed.
pub const MAX_VIOLATIONS: u32 = 3;

/// Outcome of checking one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Drop the frame and tell the client it is going too fast.
    Throttle,
    /// Too many violations in a row.
    Disconnect,
}

/// Per-connection rate limiter with a violation counter.
#[derive(Debug)]
pub struct FloodLimiter {
    limiter: DefaultDirectRateLimiter,
    violations: u32,
}

impl FloodLimiter {
    /// `rate` frames per second, bursting up to `burst`. Zero is treated as one.
    pub fn new(rate: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            violations: 0,
        }
    }

    pub fn check(&mut self) -> Verdict {
        if self.limiter.check().is_ok() {
            self.violations = 0;
            return Verdict::Allow;
        }

        self.violations += 1;
        if self.violations >= MAX_VIOLATIONS {
            Verdict::Disconnect
        } else {
            Verdict::Throttle
        }
    }
}
