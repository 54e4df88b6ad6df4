//! Commit/rollback boundary

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::PipelineError;
use crate::pipeline::{Call, Next, Stage};

/// Runs the inner stages inside a transaction on the attached connection.
///
/// Commits on success. On error, rolls back once and returns the original
/// error; a failed rollback is logged and does not replace it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionStage;

impl TransactionStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<C, T> Stage<C, T> for TransactionStage
where
    C: Connection,
    T: Send + 'static,
{
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn execute(&self, call: &mut Call<C>, next: Next<'_, C, T>) -> Result<T, PipelineError> {
        call.connection()?.begin().await?;

        let err = match next.run(call).await {
            Ok(value) => match call.connection()?.commit().await {
                Ok(()) => {
                    debug!("Transaction committed successfully");
                    return Ok(value);
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        warn!("Error during transaction: {}", err);
        if let Ok(conn) = call.connection() {
            match conn.rollback().await {
                Ok(()) => debug!("Transaction rolled back"),
                Err(rb) => warn!("Rollback failed: {}", rb),
            }
        }
        Err(err)
    }
}
