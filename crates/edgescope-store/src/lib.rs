//! edgescope-store — access to the orchestrator's proxy store.
//!
//! The pipeline needs five primitives from the store: point reads, key
//! listing by glob pattern, score-range reads over sorted sets, point
//! writes, and a liveness check. [`ProxyStore`] captures exactly that.
//!
//! # Architecture
//!
//! ```text
//! ProxyStore
//!   ├── RedisStore   → redis::Connection (optionally TLS via rustls)
//!   └── MemoryStore  → in-process map with sorted sets (tests, demos)
//! ```
//!
//! The store is not transactional: two reads issued in the same cycle may
//! observe different instants.

pub mod error;
pub mod memory;
pub mod redis_store;

pub use error::{StoreError, StoreResult};
pub use memory::{CallCounts, MemoryStore};
pub use redis_store::{ConnectOptions, RedisStore};

/// Capability set the pipeline consumes from the proxy store.
///
/// Methods take `&mut self` because network adapters hold a single
/// stateful connection.
pub trait ProxyStore: Send {
    /// Read a string value. `Ok(None)` if the key does not exist.
    fn get(&mut self, key: &str) -> StoreResult<Option<String>>;

    /// List keys matching a glob pattern (`*`, `?`).
    fn keys_matching(&mut self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Members of a sorted set with `min <= score <= max`, ascending by score.
    fn range_by_score(&mut self, key: &str, min: f64, max: f64)
    -> StoreResult<Vec<(String, f64)>>;

    /// Write a string value.
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;

    /// Verify the store is reachable.
    fn ping(&mut self) -> StoreResult<()>;

    /// Release the underlying connection, if any.
    fn close(&mut self) {}
}

impl<S: ProxyStore + ?Sized> ProxyStore for Box<S> {
    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn keys_matching(&mut self, pattern: &str) -> StoreResult<Vec<String>> {
        (**self).keys_matching(pattern)
    }

    fn range_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        (**self).range_by_score(key, min, max)
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn ping(&mut self) -> StoreResult<()> {
        (**self).ping()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
