//! Infrastructure layer - stores, services and runtime plumbing

pub mod cache;
pub mod key;
pub mod logging;
pub mod observability;
pub mod ratelimit;
pub mod storage;
