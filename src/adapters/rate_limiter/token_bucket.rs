//! Token-bucket rate limiter used to pace campaign sends.
//!
//! The bucket holds up to `messages` tokens and refills continuously at
//! `messages / interval`. It starts full, so a campaign may burst one
//! window's worth before settling to the configured rate.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::campaign::RateLimit;
use crate::ports::{RateLimiter, RateLimiterFactory};

/// Process-local token bucket.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketLimiter {
    /// Creates a full bucket.
    ///
    /// Callers are expected to have checked `RateLimit::is_valid`; a zero
    /// rate is clamped to one message per interval.
    pub fn new(rate: RateLimit) -> Self {
        Self::starting_at(rate, Instant::now())
    }

    fn starting_at(rate: RateLimit, now: Instant) -> Self {
        let messages = rate.messages.max(1) as f64;
        let interval = rate.interval.max(Duration::from_millis(1)).as_secs_f64();
        Self {
            capacity: messages,
            refill_rate: messages / interval,
            state: Mutex::new(BucketState {
                tokens: messages,
                last_refill: now,
            }),
        }
    }

    /// Tokens currently available.
    pub fn available(&self) -> f64 {
        self.available_at(Instant::now())
    }

    fn available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);
        state.tokens
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        if now > state.last_refill {
            state.last_refill = now;
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            tokio::time::sleep(wait).await;
        }
    }

    fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }
}

/// Builds a token bucket per campaign, substituting `fallback` for rates
/// that cannot pace anything.
#[derive(Debug, Clone)]
pub struct TokenBucketFactory {
    fallback: RateLimit,
}

impl TokenBucketFactory {
    pub fn new(fallback: RateLimit) -> Self {
        Self { fallback }
    }

    /// The rate a campaign will actually be paced at.
    pub fn effective_rate(&self, rate: RateLimit) -> RateLimit {
        if rate.is_valid() {
            rate
        } else {
            self.fallback
        }
    }
}

impl Default for TokenBucketFactory {
    fn default() -> Self {
        Self::new(RateLimit::default())
    }
}

impl RateLimiterFactory for TokenBucketFactory {
    fn limiter_for(&self, rate: RateLimit) -> Arc<dyn RateLimiter> {
        let effective = self.effective_rate(rate);
        if effective != rate {
            tracing::warn!(
                messages = rate.messages,
                interval_ms = rate.interval.as_millis() as u64,
                "Invalid campaign rate limit, using default"
            );
        }
        Arc::new(TokenBucketLimiter::new(effective))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ─── Bucket accounting ───

    #[test]
    fn starts_full_then_denies() {
        let t0 = Instant::now();
        let bucket = TokenBucketLimiter::starting_at(RateLimit::per_second(3), t0);

        assert!(bucket.try_acquire_at(t0).is_ok());
        assert!(bucket.try_acquire_at(t0).is_ok());
        assert!(bucket.try_acquire_at(t0).is_ok());

        let wait = bucket.try_acquire_at(t0).unwrap_err();
        assert!(wait > Duration::from_millis(330));
        assert!(wait <= Duration::from_millis(334));
    }

    #[test]
    fn refills_over_time() {
        let t0 = Instant::now();
        let bucket = TokenBucketLimiter::starting_at(RateLimit::per_second(2), t0);
        bucket.try_acquire_at(t0).unwrap();
        bucket.try_acquire_at(t0).unwrap();
        assert!(bucket.try_acquire_at(t0).is_err());

        let later = t0 + Duration::from_millis(500);
        assert!(bucket.try_acquire_at(later).is_ok());
        assert!(bucket.try_acquire_at(later).is_err());
    }

    #[test]
    fn never_exceeds_capacity() {
        let t0 = Instant::now();
        let bucket = TokenBucketLimiter::starting_at(RateLimit::per_second(5), t0);
        let available = bucket.available_at(t0 + Duration::from_secs(60));
        assert!((available - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_token() {
        let bucket = TokenBucketLimiter::new(RateLimit::new(1, Duration::from_millis(50)));
        bucket.acquire().await;

        let started = Instant::now();
        bucket.acquire().await;

        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    // ─── Factory ───

    #[test]
    fn factory_replaces_invalid_rates() {
        let fallback = RateLimit::per_second(7);
        let factory = TokenBucketFactory::new(fallback);

        assert_eq!(factory.effective_rate(RateLimit::per_second(0)), fallback);
        assert_eq!(
            factory.effective_rate(RateLimit::new(10, Duration::ZERO)),
            fallback
        );
        assert_eq!(
            factory.effective_rate(RateLimit::per_second(50)),
            RateLimit::per_second(50)
        );
    }

    proptest! {
        #[test]
        fn burst_is_bounded_by_budget(messages in 1u32..500) {
            let t0 = Instant::now();
            let bucket = TokenBucketLimiter::starting_at(
                RateLimit::new(messages, Duration::from_secs(60)),
                t0,
            );
            let granted = (0..messages * 2)
                .filter(|_| bucket.try_acquire_at(t0).is_ok())
                .count();
            prop_assert_eq!(granted, messages as usize);
        }

        #[test]
        fn sustained_rate_matches_configuration(messages in 1u32..100, elapsed_ms in 0u64..10_000) {
            let t0 = Instant::now();
            let bucket = TokenBucketLimiter::starting_at(RateLimit::per_second(messages), t0);
            while bucket.try_acquire_at(t0).is_ok() {}

            let later = t0 + Duration::from_millis(elapsed_ms);
            let expected = ((messages as f64) * (elapsed_ms as f64) / 1000.0)
                .min(messages as f64);
            prop_assert!((bucket.available_at(later) - expected).abs() < 1e-6);
        }
    }
}
