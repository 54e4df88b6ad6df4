//! Pipeline stages
//!
//! The canonical order is `connect → retry → transaction → cache`, outermost
//! first.

mod cache;
mod connect;
mod retry;
mod transaction;

pub use cache::CacheStage;
pub use connect::ConnectStage;
pub use retry::{RetryPolicy, RetryStage};
pub use transaction::TransactionStage;
