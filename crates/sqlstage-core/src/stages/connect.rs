//! Connection-scoped execution

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::connection::{Connection, Connector};
use crate::error::PipelineError;
use crate::pipeline::{Call, Next, Stage};

/// Opens a connection for the inner stages and closes it on every exit path.
///
/// A connection already attached to the call is set aside for the duration
/// and restored afterwards. If the stage future is dropped mid-call, the
/// outer connection is still restored and the inner one is dropped instead
/// of closed.
pub struct ConnectStage<K> {
    connector: K,
}

impl<K: Connector> ConnectStage<K> {
    pub fn new(connector: K) -> Self {
        Self { connector }
    }
}

/// A call with a stage-owned connection swapped into its slot
struct Attached<'a, C> {
    call: &'a mut Call<C>,
    outer: Option<Option<C>>,
}

impl<'a, C> Attached<'a, C> {
    fn new(call: &'a mut Call<C>, conn: C) -> Self {
        let outer = call.restore(Some(conn));
        Self {
            call,
            outer: Some(outer),
        }
    }

    /// Put the outer connection back and hand out ours
    fn release(mut self) -> Option<C> {
        self.swap_back()
    }

    fn swap_back(&mut self) -> Option<C> {
        let outer = self.outer.take()?;
        self.call.restore(outer)
    }
}

impl<C> Deref for Attached<'_, C> {
    type Target = Call<C>;

    fn deref(&self) -> &Call<C> {
        self.call
    }
}

impl<C> DerefMut for Attached<'_, C> {
    fn deref_mut(&mut self) -> &mut Call<C> {
        self.call
    }
}

impl<C> Drop for Attached<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.swap_back() {
            warn!("Call dropped before completion, releasing database connection");
            drop(conn);
        }
    }
}

#[async_trait]
impl<K, T> Stage<K::Connection, T> for ConnectStage<K>
where
    K: Connector,
    T: Send + 'static,
{
    fn name(&self) -> &'static str {
        "connect"
    }

    async fn execute(
        &self,
        call: &mut Call<K::Connection>,
        next: Next<'_, K::Connection, T>,
    ) -> Result<T, PipelineError> {
        let conn = self.connector.connect().await?;
        debug!("Database connection established");

        let mut attached = Attached::new(call, conn);
        let result = next.run(&mut *attached).await;

        if let Some(conn) = attached.release() {
            match conn.close().await {
                Ok(()) => debug!("Database connection closed"),
                Err(e) => warn!("Failed to close database connection: {}", e),
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::pipeline::Operation;
    use crate::testing::{FakeConnection, FakeConnector, Scripted};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Never finishes within the test timeouts
    struct Stall;

    #[async_trait]
    impl Operation<FakeConnection, u32> for Stall {
        async fn run(&self, _call: &mut Call<FakeConnection>) -> Result<u32, PipelineError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_closes_exactly_once_on_success() {
        let connector = FakeConnector::new();
        let state = connector.state();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let op = Scripted::succeed_after(0, 7);
        let mut call = Call::new();
        assert_eq!(pipeline.execute(&mut call, &op).await.unwrap(), 7);

        assert_eq!(state.connects(), 1);
        assert_eq!(state.closes(), 1);
        assert!(!call.is_connected());
    }

    #[tokio::test]
    async fn test_closes_exactly_once_on_error() {
        let connector = FakeConnector::new();
        let state = connector.state();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let op = Scripted::always_fail();
        let err = pipeline.execute(&mut Call::new(), &op).await.unwrap_err();

        assert!(matches!(err, PipelineError::Operation(_)));
        assert_eq!(state.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_skips_operation() {
        let connector = FakeConnector::unreachable();
        let state = connector.state();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let op = Scripted::succeed_after(0, 7);
        let err = pipeline.execute(&mut Call::new(), &op).await.unwrap_err();

        assert!(matches!(err, PipelineError::Connection(_)));
        assert_eq!(op.calls(), 0);
        assert_eq!(state.closes(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_keeps_result() {
        let connector = FakeConnector::new().failing_close();
        let state = connector.state();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let op = Scripted::succeed_after(0, 7);
        assert_eq!(pipeline.execute(&mut Call::new(), &op).await.unwrap(), 7);
        assert_eq!(state.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_releases_connection() {
        let connector = FakeConnector::new();
        let state = connector.state();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let mut call = Call::new();
        let result = timeout(Duration::from_secs(1), pipeline.execute(&mut call, &Stall)).await;

        assert!(result.is_err());
        assert_eq!(state.connects(), 1);
        assert_eq!(state.closes(), 0);
        assert_eq!(state.releases(), 1);
        assert!(!call.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_restores_outer_connection() {
        let connector = FakeConnector::new();
        let state = connector.state();
        let outer = connector.connect().await.unwrap();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let mut call = Call::new();
        call.attach(outer);
        let result = timeout(Duration::from_secs(1), pipeline.execute(&mut call, &Stall)).await;

        assert!(result.is_err());
        assert_eq!(state.connects(), 2);
        assert_eq!(state.releases(), 1);
        assert_eq!(call.connection().unwrap().id(), 1);
    }

    #[tokio::test]
    async fn test_outer_connection_restored_after_success() {
        let connector = FakeConnector::new();
        let outer = connector.connect().await.unwrap();
        let pipeline: Pipeline<FakeConnection, u32> =
            Pipeline::builder().stage(ConnectStage::new(connector)).build();

        let mut call = Call::new();
        call.attach(outer);
        let op = Scripted::succeed_after(0, 7);
        assert_eq!(pipeline.execute(&mut call, &op).await.unwrap(), 7);
        assert_eq!(call.connection().unwrap().id(), 1);
    }
}
