pub mod config;
pub mod error;
pub mod report;
pub mod ttl;

pub use config::CacheConfig;
pub use config::RateLimitConfig;
pub use config::ResilienceConfig;
pub use config::RetryConfig;
pub use error::QuotaHint;
pub use error::Result;
pub use error::ServiceError;
pub use report::DegradedReport;
pub use report::Report;
pub use ttl::TtlClass;
