//! sqlstage Core
//!
//! This crate composes database calls out of named pipeline stages:
//! connection scoping, retries, transactions and a time-bounded query cache.

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod operations;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStats, QueryCache, spawn_purge_task};
pub use config::{CacheConfig, RetryConfig};
pub use connection::{Connection, Connector, SqliteConnector};
pub use error::PipelineError;
pub use operations::{FetchUsers, RunQuery, UpdateUserEmail, UserByAge, UserById, UsersOlderThan};
pub use pipeline::{Call, Next, Operation, Pipeline, PipelineBuilder, Stage};
pub use stages::{CacheStage, ConnectStage, RetryPolicy, RetryStage, TransactionStage};
