//! Rate limit infrastructure - counters, repositories and the service

mod factory;
mod in_memory;
mod memory_counter;
mod postgres;
mod redis_counter;
mod service;

pub use factory::{create_counter, CounterType};
pub use in_memory::InMemoryRatelimitRepository;
pub use memory_counter::InMemoryRatelimitCounter;
pub use postgres::PostgresRatelimitRepository;
pub use redis_counter::RedisRatelimitCounter;
pub use service::{RatelimitService, SetOverrideRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
