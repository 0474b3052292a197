//! Per-source backpressure for the UDP ingress path

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified datagrams per second
pub fn create_limiter(datagrams_per_second: u32) -> Arc<Limiter> {
    let quota =
        Quota::per_second(NonZeroU32::new(datagrams_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Default datagram budget per authenticated source
pub const SOURCE_RATE_LIMIT: u32 = 200;

/// Per-source rate limiter state, owned by the Ingress alongside the AuthCache entry
#[derive(Clone)]
pub struct SourceRateLimiter {
    limiter: Arc<Limiter>,
}

impl SourceRateLimiter {
    pub fn new() -> Self {
        Self {
            limiter: create_limiter(SOURCE_RATE_LIMIT),
        }
    }

    /// Returns true if the current datagram is within budget
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for SourceRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
