//! A single SQLite connection with explicit transaction control

use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info};

use crate::error::DbError;

/// One open database session.
///
/// A session owns exactly one connection. Transaction boundaries are issued
/// as plain statements so a session can be handed to pipeline stages that
/// begin, commit or roll back around an operation without borrowing a
/// transaction guard across them.
pub struct Session {
    pub(crate) conn: SqliteConnection,
    url: String,
    in_transaction: bool,
}

impl Session {
    /// Open a new session
    pub async fn open(database_url: &str) -> Result<Self, DbError> {
        debug!("Opening database session: {}", database_url);

        let conn = SqliteConnection::connect(database_url).await?;
        Ok(Self {
            conn,
            url: database_url.to_string(),
            in_transaction: false,
        })
    }

    /// Open a session and make sure the schema exists
    pub async fn open_and_migrate(database_url: &str) -> Result<Self, DbError> {
        let mut session = Self::open(database_url).await?;
        session.migrate().await?;
        Ok(session)
    }

    /// The URL this session was opened with
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the underlying connection for advanced usage
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run database migrations
    pub async fn migrate(&mut self) -> Result<(), DbError> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                age REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut self.conn)
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_users_age ON users(age)
            "#,
        )
        .execute(&mut self.conn)
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Begin a transaction
    pub async fn begin(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::InvalidArgument(
                "transaction already in progress".to_string(),
            ));
        }
        sqlx::query("BEGIN").execute(&mut self.conn).await?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction
    pub async fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::InvalidArgument(
                "no transaction in progress".to_string(),
            ));
        }
        let result = sqlx::query("COMMIT").execute(&mut self.conn).await;
        // A failed COMMIT leaves SQLite in the transaction; keep the flag so
        // the caller can still roll back.
        result?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back the open transaction
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::InvalidArgument(
                "no transaction in progress".to_string(),
            ));
        }
        self.in_transaction = false;
        sqlx::query("ROLLBACK").execute(&mut self.conn).await?;
        Ok(())
    }

    /// Close the session, releasing the connection
    pub async fn close(self) -> Result<(), DbError> {
        debug!("Closing database session: {}", self.url);
        self.conn.close().await?;
        Ok(())
    }
}
