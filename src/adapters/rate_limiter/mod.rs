//! Rate limiter adapters.
//!
//! ## Available Adapters
//!
//! - `TokenBucketLimiter` - In-process token bucket, one per campaign worker
//! - `TokenBucketFactory` - Builds buckets from campaign rate limits

mod token_bucket;

pub use token_bucket::{TokenBucketFactory, TokenBucketLimiter};
