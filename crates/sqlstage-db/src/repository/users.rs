//! User operations

use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use super::USER_COLUMNS;
use crate::error::DbError;
use crate::models::{NewUser, User};
use crate::session::Session;

impl Session {
    // ==================== User Operations ====================

    /// Insert a user, or update name and age when the email already exists
    pub async fn upsert_user(&mut self, user: NewUser) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let user_id = user
            .user_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, age, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                age = excluded.age,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.age)
        .bind(&now)
        .bind(&now)
        .execute(&mut self.conn)
        .await?;

        debug!("Upserted user {} <{}>", user_id, user.email);
        Ok(())
    }

    /// Get a user by ID
    pub async fn get_user_by_id(&mut self, user_id: &str) -> Result<Option<User>, DbError> {
        let query = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
        let result = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&mut self.conn)
            .await?;

        result.map(|row| User::try_from(&row).map_err(DbError::from)).transpose()
    }

    /// Get the first user with the given age
    pub async fn get_user_by_age(&mut self, age: f64) -> Result<Option<User>, DbError> {
        let query = format!(
            "SELECT {} FROM users WHERE age = ? ORDER BY rowid LIMIT 1",
            USER_COLUMNS
        );
        let result = sqlx::query(&query)
            .bind(age)
            .fetch_optional(&mut self.conn)
            .await?;

        result.map(|row| User::try_from(&row).map_err(DbError::from)).transpose()
    }

    /// List all users
    pub async fn list_users(&mut self) -> Result<Vec<User>, DbError> {
        let query = format!("SELECT {} FROM users ORDER BY rowid", USER_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&mut self.conn).await?;

        rows.iter()
            .map(|row| User::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// List users strictly older than `age`
    pub async fn users_older_than(&mut self, age: f64) -> Result<Vec<User>, DbError> {
        let query = format!(
            "SELECT {} FROM users WHERE age > ? ORDER BY rowid",
            USER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(age)
            .fetch_all(&mut self.conn)
            .await?;

        rows.iter()
            .map(|row| User::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Update a user's email, returns whether a row changed
    pub async fn update_user_email(
        &mut self,
        user_id: &str,
        new_email: &str,
    ) -> Result<bool, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(new_email)
        .bind(now.to_rfc3339())
        .bind(user_id)
        .execute(&mut self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count users
    pub async fn count_users(&mut self) -> Result<i64, DbError> {
        let result = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&mut self.conn)
            .await?;
        Ok(result.get("count"))
    }
}
