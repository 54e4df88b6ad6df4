//! Pipeline error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlstage_db::DbError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No connection attached to the call")]
    NoConnection,

    #[error("A valid query must be provided")]
    MissingQuery,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}
