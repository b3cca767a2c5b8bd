//! Rate limiting port for pacing outbound sends.
//!
//! Each campaign worker owns one limiter built from the campaign's
//! `RateLimit`. Sends within a page share it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::campaign::RateLimit;

/// Port for pacing operations.
///
/// Implementations must be safe to share between the concurrent send tasks
/// of one page.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until one more operation is permitted, then consume the permit.
    async fn acquire(&self);

    /// Consume a permit if one is available now; otherwise report how long
    /// until the next one.
    fn try_acquire(&self) -> Result<(), Duration>;
}

/// Builds a limiter for a campaign's configured rate.
pub trait RateLimiterFactory: Send + Sync {
    fn limiter_for(&self, rate: RateLimit) -> Arc<dyn RateLimiter>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn RateLimiter, _: &dyn RateLimiterFactory) {}
}
