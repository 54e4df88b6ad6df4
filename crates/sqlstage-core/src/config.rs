//! Stage configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stages::RetryPolicy;

/// Retry stage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of invocations
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Fixed delay between invocations, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.delay_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live of cached results, in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    /// TTL as a duration; a zero TTL would make every lookup a miss, so it
    /// is raised to one second
    pub fn ttl(&self) -> Duration {
        if self.ttl_secs == 0 {
            warn!("cache ttl_secs is 0, using 1");
            return Duration::from_secs(1);
        }
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_ttl_secs() -> u64 {
    10
}
