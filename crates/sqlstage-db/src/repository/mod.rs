//! Query operations on a [`Session`](crate::Session)

mod records;
mod stream;
mod users;

pub use stream::UserStream;

/// Columns selected for every user query
pub(crate) const USER_COLUMNS: &str = "user_id, name, email, age, created_at, updated_at";
