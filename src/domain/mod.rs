//! Domain layer - Core business logic and entities

pub mod cache;
pub mod clock;
pub mod error;
pub mod id;
pub mod key;
pub mod ratelimit;

pub use cache::{CacheEntry, CacheNamespace, CacheStore, CacheStoreExt, EntryState, Freshness};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use id::{new_id, IdPrefix};
pub use key::{
    Api, ConsumeOutcome, DeleteOutcome, Key, KeyMeta, KeyRepository, RemainingUpdate,
    VerificationCode, VerificationError, VerifiedKey,
};
pub use ratelimit::{
    LimitConfig, Page, RatelimitCounter, RatelimitNamespace, RatelimitOverride,
    RatelimitRepository, RatelimitRequest, RatelimitResponse, Window,
};
