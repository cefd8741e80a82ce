//! API middleware components

pub mod auth;
pub mod metrics;

pub use auth::RequireRootKey;
pub use metrics::metrics_middleware;
