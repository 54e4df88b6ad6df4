//! Lazy row streaming, batching and pagination

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sqlx::Row;

use super::USER_COLUMNS;
use crate::error::DbError;
use crate::models::User;
use crate::session::Session;

/// Boxed stream of users borrowed from a session
pub type UserStream<'a> = BoxStream<'a, Result<User, DbError>>;

impl Session {
    /// Stream every user, one row at a time
    pub fn stream_users(&mut self) -> UserStream<'_> {
        sqlx::query("SELECT user_id, name, email, age, created_at, updated_at FROM users ORDER BY rowid")
            .fetch(&mut self.conn)
            .map(|row| -> Result<User, DbError> {
                let row = row?;
                User::try_from(&row).map_err(DbError::from)
            })
            .boxed()
    }

    /// Stream users grouped in batches of at most `batch_size`
    pub fn stream_users_in_batches(
        &mut self,
        batch_size: usize,
    ) -> Result<BoxStream<'_, Result<Vec<User>, DbError>>, DbError> {
        if batch_size == 0 {
            return Err(DbError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }

        Ok(self
            .stream_users()
            .try_chunks(batch_size)
            .map_err(|e| e.1)
            .boxed())
    }

    /// Fetch one page of users
    pub async fn paginate_users(
        &mut self,
        page_size: i64,
        offset: i64,
    ) -> Result<Vec<User>, DbError> {
        let query = format!(
            "SELECT {} FROM users ORDER BY rowid LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(page_size)
            .bind(offset)
            .fetch_all(&mut self.conn)
            .await?;

        rows.iter()
            .map(|row| User::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Lazily yield pages of `page_size` users until an empty page is read
    pub fn lazy_paginate(
        &mut self,
        page_size: i64,
    ) -> Result<BoxStream<'_, Result<Vec<User>, DbError>>, DbError> {
        if page_size <= 0 {
            return Err(DbError::InvalidArgument(
                "page size must be at least 1".to_string(),
            ));
        }

        Ok(stream::try_unfold((self, 0i64), move |(session, offset)| async move {
            let page = session.paginate_users(page_size, offset).await?;
            if page.is_empty() {
                return Ok::<_, DbError>(None);
            }
            let next = offset + page.len() as i64;
            Ok(Some((page, (session, next))))
        })
        .boxed())
    }

    /// Stream the age of every user
    pub fn stream_user_ages(&mut self) -> BoxStream<'_, Result<f64, DbError>> {
        sqlx::query("SELECT age FROM users ORDER BY rowid")
            .fetch(&mut self.conn)
            .map(|row| -> Result<f64, DbError> { Ok(row?.try_get::<f64, _>("age")?) })
            .boxed()
    }

    /// Average user age computed over the age stream, `None` when there are no users
    pub async fn average_age(&mut self) -> Result<Option<f64>, DbError> {
        let (total, count) = self
            .stream_user_ages()
            .try_fold((0.0f64, 0u64), |(total, count), age| async move {
                Ok((total + age, count + 1))
            })
            .await?;

        if count == 0 {
            return Ok(None);
        }
        Ok(Some(total / count as f64))
    }
}
