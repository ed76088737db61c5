pub mod cache;

pub use cache::CacheStats;
pub use cache::ResponseCache;
