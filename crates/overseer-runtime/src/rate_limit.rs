//! Per-parent spawn rate limiting.
//!
//! A parent may create at most `spawnRateLimitPerHour` children per hour.
//! The quota is a GCRA bucket per parent id: a full burst of `n` is allowed,
//! after which one more slot frees up every `3600 / n` seconds.

use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use overseer_core::RegistrationId;
use std::num::NonZeroU32;
use std::time::Duration;

type ParentRateLimiter =
    RateLimiter<RegistrationId, DefaultKeyedStateStore<RegistrationId>, DefaultClock>;

/// Keyed limiter over parent registration ids.
pub struct SpawnRateLimiter {
    limiter: ParentRateLimiter,
    per_hour: u32,
}

impl SpawnRateLimiter {
    /// Returns `None` when `per_hour` is zero.
    pub fn new(per_hour: u32) -> Option<Self> {
        let quota = Quota::per_hour(NonZeroU32::new(per_hour)?);
        Some(Self {
            limiter: RateLimiter::keyed(quota),
            per_hour,
        })
    }

    pub fn per_hour(&self) -> u32 {
        self.per_hour
    }

    /// Consume one spawn for `parent_id`. On refusal, returns how long until
    /// the next spawn would be allowed.
    pub fn check(&self, parent_id: &RegistrationId) -> Result<(), Duration> {
        self.limiter
            .check_key(parent_id)
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Drop state for parents whose bucket is full again.
    pub fn shrink(&self) {
        self.limiter.retain_recent();
    }
}

impl std::fmt::Debug for SpawnRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnRateLimiter")
            .field("per_hour", &self.per_hour)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables() {
        assert!(SpawnRateLimiter::new(0).is_none());
    }

    #[test]
    fn test_burst_then_refuse() {
        let limiter = SpawnRateLimiter::new(2).unwrap();
        let parent = RegistrationId::generate();

        assert!(limiter.check(&parent).is_ok());
        assert!(limiter.check(&parent).is_ok());
        let wait = limiter.check(&parent).unwrap_err();
        assert!(wait > Duration::from_secs(60));
    }

    #[test]
    fn test_keyed_per_parent() {
        let limiter = SpawnRateLimiter::new(1).unwrap();
        let a = RegistrationId::generate();
        let b = RegistrationId::generate();

        assert!(limiter.check(&a).is_ok());
        assert!(limiter.check(&a).is_err());
        assert!(limiter.check(&b).is_ok());
        limiter.shrink();
    }
}
