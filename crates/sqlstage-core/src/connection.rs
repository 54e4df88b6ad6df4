//! Connection abstraction used by the connect and transaction stages

use async_trait::async_trait;
use sqlstage_db::Session;
use tracing::debug;

use crate::error::PipelineError;

/// An open database handle
#[async_trait]
pub trait Connection: Send + 'static {
    async fn begin(&mut self) -> Result<(), PipelineError>;

    async fn commit(&mut self) -> Result<(), PipelineError>;

    async fn rollback(&mut self) -> Result<(), PipelineError>;

    /// Release the handle
    async fn close(self) -> Result<(), PipelineError>;
}

/// Source of fresh connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Open a new connection, failures are reported as [`PipelineError::Connection`]
    async fn connect(&self) -> Result<Self::Connection, PipelineError>;
}

#[async_trait]
impl Connection for Session {
    async fn begin(&mut self) -> Result<(), PipelineError> {
        Ok(Session::begin(self).await?)
    }

    async fn commit(&mut self) -> Result<(), PipelineError> {
        Ok(Session::commit(self).await?)
    }

    async fn rollback(&mut self) -> Result<(), PipelineError> {
        Ok(Session::rollback(self).await?)
    }

    async fn close(self) -> Result<(), PipelineError> {
        Ok(Session::close(self).await?)
    }
}

/// Opens one SQLite [`Session`] per call
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    database_url: String,
    migrate: bool,
}

impl SqliteConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            migrate: false,
        }
    }

    /// Build a connector for a database file, creating it if missing
    pub fn for_path(path: &str) -> Self {
        Self::new(format!("sqlite:{}?mode=rwc", path))
    }

    /// Run schema migrations on every new session
    pub fn with_migrations(mut self) -> Self {
        self.migrate = true;
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Connection = Session;

    async fn connect(&self) -> Result<Session, PipelineError> {
        debug!("Connecting to {}", self.database_url);

        let result = if self.migrate {
            Session::open_and_migrate(&self.database_url).await
        } else {
            Session::open(&self.database_url).await
        };
        result.map_err(|e| PipelineError::Connection(e.to_string()))
    }
}
