//! Versioned response store backing the offline cache.
//!
//! A store is a named container (the name is the version tag) mapping a GET
//! request to the response captured for it. Only GET requests are ever written
//! or matched. Several stores may coexist on disk; the lifecycle code decides
//! which one is current and deletes the rest.

mod key;
mod memory;
mod storage;
mod traits;

pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::CacheStorage;
#[cfg(test)]
pub use traits::CachedResponse;
