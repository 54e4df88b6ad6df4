//! In-memory doubles for stage tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{Connection, Connector};
use crate::error::PipelineError;
use crate::pipeline::{Call, Operation};

/// Counters and committed rows shared by a connector and its connections
#[derive(Default)]
pub struct FakeState {
    connects: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    releases: AtomicUsize,
    committed: Mutex<Vec<String>>,
}

impl FakeState {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Connections dropped, whether closed first or not
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn committed_rows(&self) -> Vec<String> {
        self.committed.lock().clone()
    }
}

pub struct FakeConnector {
    state: Arc<FakeState>,
    reachable: bool,
    fail_close: bool,
    fail_commit: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
            reachable: true,
            fail_close: false,
            fail_commit: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn state(&self) -> Arc<FakeState> {
        self.state.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection, PipelineError> {
        if !self.reachable {
            return Err(PipelineError::Connection("database unreachable".to_string()));
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeConnection {
            id,
            state: self.state.clone(),
            staged: Vec::new(),
            in_transaction: false,
            fail_close: self.fail_close,
            fail_commit: self.fail_commit,
        })
    }
}

/// Writes are staged inside a transaction and only become visible on commit
pub struct FakeConnection {
    id: usize,
    state: Arc<FakeState>,
    staged: Vec<String>,
    in_transaction: bool,
    fail_close: bool,
    fail_commit: bool,
}

impl FakeConnection {
    /// 1-based connect order
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn write(&mut self, row: &str) {
        if self.in_transaction {
            self.staged.push(row.to_string());
        } else {
            self.state.committed.lock().push(row.to_string());
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn begin(&mut self) -> Result<(), PipelineError> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PipelineError> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            return Err(PipelineError::Operation("commit failed".to_string()));
        }
        self.state.committed.lock().append(&mut self.staged);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PipelineError> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.staged.clear();
        self.in_transaction = false;
        Ok(())
    }

    async fn close(self) -> Result<(), PipelineError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(PipelineError::Connection("close failed".to_string()));
        }
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Operation that fails a fixed number of times before returning a value
pub struct Scripted {
    calls: AtomicUsize,
    failures: Option<usize>,
    value: u32,
}

impl Scripted {
    pub fn succeed_after(failures: usize, value: u32) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures: Some(failures),
            value,
        }
    }

    pub fn always_fail() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures: None,
            value: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Send + 'static> Operation<C, u32> for Scripted {
    async fn run(&self, _call: &mut Call<C>) -> Result<u32, PipelineError> {
        let call_no = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.failures {
            Some(failures) if call_no > failures => Ok(self.value),
            _ => Err(PipelineError::Operation(format!("fault {}", call_no))),
        }
    }
}

/// Operation that writes rows through the fake connection
pub struct WriteRows {
    rows: Vec<String>,
    fail_after_writes: bool,
}

impl WriteRows {
    pub fn new(rows: &[&str]) -> Self {
        Self {
            rows: rows.iter().map(|r| r.to_string()).collect(),
            fail_after_writes: false,
        }
    }

    pub fn failing_after_writes(mut self) -> Self {
        self.fail_after_writes = true;
        self
    }
}

#[async_trait]
impl Operation<FakeConnection, u32> for WriteRows {
    async fn run(&self, call: &mut Call<FakeConnection>) -> Result<u32, PipelineError> {
        let conn = call.connection()?;
        for row in &self.rows {
            conn.write(row);
        }
        if self.fail_after_writes {
            return Err(PipelineError::Operation("write failed".to_string()));
        }
        Ok(self.rows.len() as u32)
    }
}
