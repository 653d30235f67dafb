//! Gateway middleware

pub mod metrics;
pub mod rate_limit;
pub mod session;
