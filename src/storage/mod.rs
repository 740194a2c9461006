pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use anyhow::Result;

/// Byte-string key/value store backing the HTTP response cache
///
/// This is the whole contract the cache transport needs, so a persistent store and an
/// in-memory one are interchangeable.
pub trait CacheStore: Send + Sync {
    /// Retrieve the value stored under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
}
