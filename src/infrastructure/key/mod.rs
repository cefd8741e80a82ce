//! Key infrastructure - generation, repositories and the key service

pub mod generator;
mod in_memory;
mod postgres;
mod service;

pub use generator::{digest, generate, GeneratedKey, DEFAULT_BYTE_LENGTH};
pub use in_memory::InMemoryKeyRepository;
pub use postgres::PostgresKeyRepository;
pub use service::{CreateKeyRequest, CreatedKey, KeyService, DEFAULT_WORKSPACE_ID};
