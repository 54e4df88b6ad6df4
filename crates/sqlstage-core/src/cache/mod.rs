//! Query result caching

mod query_cache;

pub use query_cache::{CacheStats, QueryCache, spawn_purge_task};
