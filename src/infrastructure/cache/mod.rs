//! Cache infrastructure - stores and the SWR layer

mod factory;
mod in_memory;
mod redis;
mod swr;

pub use factory::{CacheConfig, CacheFactory, CacheType};
pub use in_memory::{InMemoryCacheConfig, InMemoryCacheStore};
pub use redis::{RedisCacheConfig, RedisCacheStore};
pub use swr::SwrCache;
