//! Cached execution keyed by query text and bound values

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::QueryCache;
use crate::error::PipelineError;
use crate::pipeline::{Call, Next, Stage};

/// Returns a fresh cached result for the call's query text, or runs the
/// inner stages and caches what they return. Errors are never cached.
pub struct CacheStage<T> {
    cache: Arc<QueryCache<T>>,
}

impl<T: Clone> CacheStage<T> {
    pub fn new(cache: Arc<QueryCache<T>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache<T>> {
        &self.cache
    }
}

#[async_trait]
impl<C, T> Stage<C, T> for CacheStage<T>
where
    C: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn execute(&self, call: &mut Call<C>, next: Next<'_, C, T>) -> Result<T, PipelineError> {
        let key = call.cache_key().ok_or(PipelineError::MissingQuery)?;

        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let value = next.run(call).await?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }
}
