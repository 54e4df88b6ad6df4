//! Time-bounded cache of query results keyed by query text

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an entry older than the TTL
    pub expired: u64,
    pub entries: u64,
}

struct CachedResult<T> {
    value: T,
    inserted_at: Instant,
}

struct Inner<T> {
    entries: HashMap<String, CachedResult<T>>,
    stats: CacheStats,
}

/// Query cache with a fixed time-to-live.
///
/// Entries are invalidated lazily when a lookup finds them stale. There is no
/// size bound. The lock is never held across an await, so two callers that
/// miss on the same query both run it and the later insert wins.
pub struct QueryCache<T> {
    inner: Mutex<Inner<T>>,
    ttl: Duration,
}

impl<T: Clone> QueryCache<T> {
    pub fn new(ttl: Duration) -> Self {
        info!("Initializing query cache (ttl: {:?})", ttl);

        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh result for `query`
    pub fn get(&self, query: &str) -> Option<T> {
        let mut inner = self.inner.lock();

        let fresh = match inner.entries.get(query) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                debug!("Cache expired: {}", query);
                inner.entries.remove(query);
                inner.stats.expired += 1;
                None
            }
            None => None,
        };

        match fresh {
            Some(value) => {
                debug!("Cache hit: {}", query);
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store a result, replacing any previous one
    pub fn insert(&self, query: impl Into<String>, value: T) {
        let query = query.into();
        debug!("Cache updated: {}", query);
        self.inner.lock().entries.insert(
            query,
            CachedResult {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop one entry, returns whether it existed
    pub fn invalidate(&self, query: &str) -> bool {
        self.inner.lock().entries.remove(query).is_some()
    }

    /// Remove every stale entry
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        let purged = before - inner.entries.len();
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    /// Remove every entry
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        info!("Cleared {} cache entries", count);
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len() as u64,
            ..inner.stats
        }
    }
}

/// Spawn a background task that purges stale entries periodically.
///
/// A zero interval is raised to one second.
pub fn spawn_purge_task<T>(cache: Arc<QueryCache<T>>, every: Duration) -> tokio::task::JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    use tokio::time::interval;

    let every = if every.is_zero() {
        warn!("Cache purge interval must be positive, using 1s");
        Duration::from_secs(1)
    } else {
        every
    };

    info!("Starting background cache purge task (interval: {:?})", every);

    tokio::spawn(async move {
        let mut ticker = interval(every);

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            cache.purge_expired();
        }
    })
}
