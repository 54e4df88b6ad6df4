//! Ready-made operations over a SQLite [`Session`]

use async_trait::async_trait;
use sqlstage_db::{Record, Session, User};
use tracing::info;

use crate::error::PipelineError;
use crate::pipeline::{Call, Operation};

/// Every user in the table
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchUsers;

#[async_trait]
impl Operation<Session, Vec<User>> for FetchUsers {
    async fn run(&self, call: &mut Call<Session>) -> Result<Vec<User>, PipelineError> {
        Ok(call.connection()?.list_users().await?)
    }
}

/// Users strictly older than `age`
#[derive(Debug, Clone, Copy)]
pub struct UsersOlderThan {
    pub age: f64,
}

#[async_trait]
impl Operation<Session, Vec<User>> for UsersOlderThan {
    async fn run(&self, call: &mut Call<Session>) -> Result<Vec<User>, PipelineError> {
        Ok(call.connection()?.users_older_than(self.age).await?)
    }
}

/// First user with the given age
#[derive(Debug, Clone, Copy)]
pub struct UserByAge {
    pub age: f64,
}

#[async_trait]
impl Operation<Session, Option<User>> for UserByAge {
    async fn run(&self, call: &mut Call<Session>) -> Result<Option<User>, PipelineError> {
        Ok(call.connection()?.get_user_by_age(self.age).await?)
    }
}

#[derive(Debug, Clone)]
pub struct UserById {
    pub user_id: String,
}

#[async_trait]
impl Operation<Session, Option<User>> for UserById {
    async fn run(&self, call: &mut Call<Session>) -> Result<Option<User>, PipelineError> {
        Ok(call.connection()?.get_user_by_id(&self.user_id).await?)
    }
}

/// Change one user's email; an unknown user is an error so that an
/// enclosing transaction rolls back
#[derive(Debug, Clone)]
pub struct UpdateUserEmail {
    pub user_id: String,
    pub new_email: String,
}

#[async_trait]
impl Operation<Session, ()> for UpdateUserEmail {
    async fn run(&self, call: &mut Call<Session>) -> Result<(), PipelineError> {
        let updated = call
            .connection()?
            .update_user_email(&self.user_id, &self.new_email)
            .await?;
        if !updated {
            return Err(PipelineError::NotFound(format!("user {}", self.user_id)));
        }
        info!("Email updated for user_id {} to {}", self.user_id, self.new_email);
        Ok(())
    }
}

/// Runs the call's literal query text with its bound values and returns
/// every row
#[derive(Debug, Clone, Copy, Default)]
pub struct RunQuery;

#[async_trait]
impl Operation<Session, Vec<Record>> for RunQuery {
    async fn run(&self, call: &mut Call<Session>) -> Result<Vec<Record>, PipelineError> {
        let query = call.query().ok_or(PipelineError::MissingQuery)?.to_string();
        let params = call.params().to_vec();
        Ok(call.connection()?.fetch_records(&query, &params).await?)
    }
}
