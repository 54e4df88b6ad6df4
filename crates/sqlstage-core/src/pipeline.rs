//! Stage pipeline
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s wrapped around an
//! [`Operation`]. The first stage is the outermost one: it receives the call
//! and a [`Next`] handle that runs the remaining stages and, after the last
//! stage, the operation itself. A stage may run `Next` zero times (cache
//! hit), once, or several times (retry).

use std::sync::Arc;

use async_trait::async_trait;
use sqlstage_db::QueryParam;
use tracing::debug;

use crate::error::PipelineError;

/// Per-invocation context shared by every stage and the operation
pub struct Call<C> {
    query: Option<String>,
    params: Vec<QueryParam>,
    conn: Option<C>,
}

impl<C> Call<C> {
    /// A call without query text
    pub fn new() -> Self {
        Self {
            query: None,
            params: Vec::new(),
            conn: None,
        }
    }

    /// A call carrying literal query text
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            params: Vec::new(),
            conn: None,
        }
    }

    /// Values for the query's `?` placeholders, in order
    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }

    /// Query text, `None` when absent or blank
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.trim().is_empty())
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    /// Cache key: the literal query text, followed by the bound values when
    /// there are any
    pub fn cache_key(&self) -> Option<String> {
        let query = self.query()?;
        if self.params.is_empty() {
            Some(query.to_string())
        } else {
            Some(format!("{}\0{:?}", query, self.params))
        }
    }

    /// Borrow the attached connection
    pub fn connection(&mut self) -> Result<&mut C, PipelineError> {
        self.conn.as_mut().ok_or(PipelineError::NoConnection)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Attach a connection, returning the one it replaces
    pub fn attach(&mut self, conn: C) -> Option<C> {
        self.conn.replace(conn)
    }

    /// Detach the connection, if any
    pub fn detach(&mut self) -> Option<C> {
        self.conn.take()
    }

    pub(crate) fn restore(&mut self, conn: Option<C>) -> Option<C> {
        std::mem::replace(&mut self.conn, conn)
    }
}

impl<C> Default for Call<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The innermost step of a pipeline
#[async_trait]
pub trait Operation<C, T>: Send + Sync {
    async fn run(&self, call: &mut Call<C>) -> Result<T, PipelineError>;
}

/// A cross-cutting behavior applied around the rest of the pipeline
#[async_trait]
pub trait Stage<C, T>: Send + Sync {
    /// Stage name used in logs
    fn name(&self) -> &'static str;

    async fn execute(&self, call: &mut Call<C>, next: Next<'_, C, T>) -> Result<T, PipelineError>;
}

/// Handle to the remainder of a pipeline
pub struct Next<'a, C, T> {
    stages: &'a [Arc<dyn Stage<C, T>>],
    operation: &'a dyn Operation<C, T>,
}

impl<C, T> Clone for Next<'_, C, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, T> Copy for Next<'_, C, T> {}

impl<C: Send, T: Send> Next<'_, C, T> {
    /// Run the remaining stages, then the operation
    pub async fn run(self, call: &mut Call<C>) -> Result<T, PipelineError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                debug!("Entering stage: {}", stage.name());
                let next = Next {
                    stages: rest,
                    operation: self.operation,
                };
                stage.execute(call, next).await
            }
            None => self.operation.run(call).await,
        }
    }
}

/// An ordered list of stages
pub struct Pipeline<C, T> {
    stages: Vec<Arc<dyn Stage<C, T>>>,
}

impl<C, T> Clone for Pipeline<C, T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<C: Send, T: Send> Pipeline<C, T> {
    pub fn builder() -> PipelineBuilder<C, T> {
        PipelineBuilder { stages: Vec::new() }
    }

    /// Stage names, outermost first
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `operation` through every stage
    pub async fn execute<O>(&self, call: &mut Call<C>, operation: &O) -> Result<T, PipelineError>
    where
        O: Operation<C, T>,
    {
        let next = Next {
            stages: &self.stages,
            operation,
        };
        next.run(call).await
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder<C, T> {
    stages: Vec<Arc<dyn Stage<C, T>>>,
}

impl<C, T> PipelineBuilder<C, T> {
    /// Append a stage inside the ones added so far
    pub fn stage<S>(mut self, stage: S) -> Self
    where
        S: Stage<C, T> + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Pipeline<C, T> {
        Pipeline {
            stages: self.stages,
        }
    }
}
