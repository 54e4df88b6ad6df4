//! Retry on failure with a fixed delay

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::PipelineError;
use crate::pipeline::{Call, Next, Stage};

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `retries` is the maximum number of invocations; zero is raised to one
    pub fn new(retries: u32, delay: Duration) -> Self {
        if retries == 0 {
            warn!("retries must be at least 1, using 1");
        }
        Self {
            retries: retries.max(1),
            delay,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Re-runs the inner stages on any error until the policy is exhausted
pub struct RetryStage {
    policy: RetryPolicy,
}

impl RetryStage {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<C, T> Stage<C, T> for RetryStage
where
    C: Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn execute(&self, call: &mut Call<C>, next: Next<'_, C, T>) -> Result<T, PipelineError> {
        let retries = self.policy.retries;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match next.run(call).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < retries => {
                    warn!("Attempt {}/{} failed: {}", attempt, retries, e);
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => {
                    warn!("All {} attempts failed: {}", retries, e);
                    return Err(e);
                }
            }
        }
    }
}
