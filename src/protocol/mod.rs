//! Wire protocol of the counter actors.

pub mod handler;
pub mod models;

pub use handler::{handle_quota, handle_rate_limit};
pub use models::{QuotaRequest, RateLimitRequest, WireResponse};
