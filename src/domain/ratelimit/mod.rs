//! Rate limit domain
//!
//! Fixed-window limits grouped under namespaces, with identifier-level
//! overrides that supersede the limit sent by the caller.

mod entity;
mod repository;

pub use entity::{
    find_matching_override, validate_duration, validate_identifier, LimitConfig, Page,
    RatelimitNamespace, RatelimitOverride, RatelimitRequest, RatelimitResponse, Window,
    MAX_DURATION,
};
pub use repository::{RatelimitCounter, RatelimitRepository};
