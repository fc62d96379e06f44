pub mod rate_limit;
pub mod twitter;

pub use rate_limit::RateLimiter;
pub use twitter::TwitterVerifier;
