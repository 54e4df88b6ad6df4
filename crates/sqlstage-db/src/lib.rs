//! sqlstage Database Layer
//!
//! This crate provides the SQLite session used by sqlstage pipelines,
//! the `users` schema, user queries, row streaming and CSV seeding.

pub mod error;
pub mod models;
pub mod repository;
pub mod seed;
pub mod session;
pub mod utils;

pub use error::DbError;
pub use models::*;
pub use seed::SeedReport;
pub use session::Session;
