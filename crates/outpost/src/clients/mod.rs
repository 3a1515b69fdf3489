//! Caller identification and per-client rate limiting.

mod caller;
mod limiter;

pub use caller::Caller;
pub use limiter::RateLimiter;
