//! Mock controllable process for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::{ControllableProcess, ProcessError, ProcessResult};

/// One call made against the mock, successful or not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessCall {
    Launch,
    Pause,
    Resume,
    IsAlive,
}

/// Simulated state of the managed process
#[derive(Debug, Clone, Default)]
pub struct MockProcessState {
    pub alive: bool,
    pub paused: bool,
    pub launches: u32,
}

#[derive(Debug, Default)]
struct Inner {
    state: MockProcessState,
    calls: Vec<ProcessCall>,
    scripted_failures: HashMap<ProcessCall, Vec<ProcessError>>,
}

/// Mock process for unit/integration testing.
///
/// Clones share state, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct MockProcess {
    inner: Arc<Mutex<Inner>>,
}

impl MockProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `times` calls of `call` fail as unreachable
    pub fn fail_next(&self, call: ProcessCall, times: usize) {
        let mut inner = self.lock();
        let queue = inner.scripted_failures.entry(call).or_default();
        queue.extend((0..times).map(|_| ProcessError::unreachable("mock: connection refused")));
    }

    /// Make the next call of `call` fail with a specific error
    pub fn fail_next_with(&self, call: ProcessCall, error: ProcessError) {
        self.lock().scripted_failures.entry(call).or_default().push(error);
    }

    /// Simulate the process dying on its own
    pub fn simulate_exit(&self) {
        let mut inner = self.lock();
        inner.state.alive = false;
        inner.state.paused = false;
    }

    pub fn state(&self) -> MockProcessState {
        self.lock().state.clone()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.lock().calls.clone()
    }

    /// Calls excluding liveness checks
    pub fn operations(&self) -> Vec<ProcessCall> {
        self.calls()
            .into_iter()
            .filter(|c| *c != ProcessCall::IsAlive)
            .collect()
    }

    pub fn count(&self, call: ProcessCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: ProcessCall) -> Result<MutexGuard<'_, Inner>, ProcessError> {
        let mut inner = self.lock();
        inner.calls.push(call);

        if let Some(queue) = inner.scripted_failures.get_mut(&call)
            && !queue.is_empty()
        {
            let error = queue.remove(0);
            debug!(?call, %error, "Mock call failing");
            return Err(error);
        }

        Ok(inner)
    }
}

#[async_trait]
impl ControllableProcess for MockProcess {
    async fn launch(&self) -> ProcessResult<()> {
        let mut inner = self.record(ProcessCall::Launch)?;
        inner.state.alive = true;
        inner.state.paused = false;
        inner.state.launches += 1;
        Ok(())
    }

    async fn pause(&self) -> ProcessResult<()> {
        let mut inner = self.record(ProcessCall::Pause)?;
        if inner.state.alive {
            inner.state.paused = true;
        }
        Ok(())
    }

    async fn resume(&self) -> ProcessResult<()> {
        let mut inner = self.record(ProcessCall::Resume)?;
        inner.state.paused = false;
        Ok(())
    }

    async fn is_alive(&self) -> ProcessResult<bool> {
        let inner = self.record(ProcessCall::IsAlive)?;
        Ok(inner.state.alive)
    }

    fn describe(&self) -> String {
        "mock process".to_string()
    }
}
