pub mod bucket;
pub mod limiter;
mod time;

pub use bucket::TokenBucket;
pub use limiter::RateLimitStatus;
pub use limiter::RateLimiter;
pub use limiter::RateLimiterMetrics;
