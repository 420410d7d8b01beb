//! Key/value persistence behind one async contract.
//!
//! Durable backends (`MemoryStore`, `SqliteStore`) keep records until they are
//! deleted. TTL backends (`TtlMemoryCache`, `RedisStore`) expire each key a
//! fixed time after it was written. A deployment picks one per key space.

pub mod entity;
pub mod errors;
pub mod layer;
pub mod memory;
#[cfg(feature = "redis")]
pub mod remote;
pub mod sqlite;
pub mod ttl;

pub use entity::{AuthorisedRequest, Entity, Fields};
pub use errors::PersistenceError;
pub use layer::{PersistenceHandle, PersistenceLayer};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use remote::RedisStore;
pub use sqlite::SqliteStore;
pub use ttl::TtlMemoryCache;

#[cfg(test)]
mod tests;
