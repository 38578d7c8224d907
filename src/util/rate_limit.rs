//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-connection limit on inbound frames; a zero rate disables it
pub struct InputRateLimiter {
    limiter: Option<Limiter>,
}

impl InputRateLimiter {
    pub fn new(messages_per_second: u32) -> Self {
        Self {
            limiter: NonZeroU32::new(messages_per_second)
                .map(|rate| RateLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_above_quota_is_refused() {
        let limiter = InputRateLimiter::new(5);
        let allowed = (0..20).filter(|_| limiter.check_input()).count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_zero_rate_disables_limit() {
        let limiter = InputRateLimiter::new(0);
        assert!((0..1000).all(|_| limiter.check_input()));
    }
}
