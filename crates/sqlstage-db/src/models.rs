//! Database models

use crate::utils::parse_datetime_or_now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::convert::Infallible;
use std::str::FromStr;

/// A result row of arbitrary shape, column name to value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

/// Integers first, then reals, `NULL` (any case), anything else is text
impl FromStr for QueryParam {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(v) = s.parse::<i64>() {
            return Ok(QueryParam::Integer(v));
        }
        if let Ok(v) = s.parse::<f64>() {
            return Ok(QueryParam::Real(v));
        }
        if s.eq_ignore_ascii_case("null") {
            return Ok(QueryParam::Null);
        }
        Ok(QueryParam::Text(s.to_string()))
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        QueryParam::Integer(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        QueryParam::Real(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        QueryParam::Text(v.to_string())
    }
}

/// User model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub age: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user (for insertion)
///
/// `user_id` is generated when absent.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: Option<String>,
    pub name: String,
    pub email: String,
    pub age: f64,
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        Ok(User {
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            age: row.try_get("age")?,
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_datetime_or_now(&row.try_get::<String, _>("updated_at")?),
        })
    }
}
