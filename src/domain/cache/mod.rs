//! Cache domain - stale-while-revalidate entries over pluggable stores

mod entry;
mod repository;

pub use entry::{CacheEntry, CacheNamespace, EntryState, Freshness};
pub use repository::{CacheStore, CacheStoreExt};

#[cfg(test)]
pub use repository::mock::MockCacheStore;
