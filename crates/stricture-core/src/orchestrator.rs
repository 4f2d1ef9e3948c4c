//! Run/pause orchestrator
//!
//! Each cycle evaluates the schedule at the clock's current instant and
//! drives the managed process toward that verdict. At most one
//! state-changing operation is issued per cycle, except on first launch
//! where a restricted verdict pauses the freshly launched process in the
//! same cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stricture_config::{DEFAULT_POLL_INTERVAL, ScheduleConfig};
use stricture_host_api::{ControllableProcess, ProcessError, ProcessResult};
use stricture_util::{Clock, RetryPolicy, SystemClock, Verdict, format_duration};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Operation, OrchestratorEvent, ScheduleEngine};

/// Errors that stop the control loop
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{operation} failed permanently: {source}")]
    Fatal {
        operation: Operation,
        #[source]
        source: ProcessError,
    },
}

/// Lifecycle of the managed process as the orchestrator understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    NotStarted,
    Running,
    Paused,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub phase: ProcessPhase,
    /// What the latest verdict asks for; None before the first cycle
    pub desired_running: Option<bool>,
    pub last_verdict: Option<Verdict>,
    pub last_known_alive: bool,
    pub launches: u32,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            phase: ProcessPhase::NotStarted,
            desired_running: None,
            last_verdict: None,
            last_known_alive: false,
            launches: 0,
        }
    }
}

/// Result of an operation run under the retry policy
enum Attempt<T> {
    Done(T),
    Abandoned,
    Cancelled,
}

pub struct Orchestrator {
    engine: ScheduleEngine,
    process: Arc<dyn ControllableProcess>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    retry: RetryPolicy,
    state: OrchestratorState,
    events: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
    cycle_events: Vec<OrchestratorEvent>,
}

impl Orchestrator {
    pub fn new(schedule: Arc<ScheduleConfig>, process: Arc<dyn ControllableProcess>) -> Self {
        Self {
            engine: ScheduleEngine::new(schedule),
            process,
            clock: Arc::new(SystemClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            state: OrchestratorState::default(),
            events: None,
            cycle_events: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        // tokio intervals reject a zero period
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Also send every event to `sink` as it happens
    pub fn with_event_sink(mut self, sink: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn engine(&self) -> &ScheduleEngine {
        &self.engine
    }

    /// Run cycles every poll interval until `cancel` fires or a fatal error occurs.
    ///
    /// The first cycle runs immediately. Returns the final state.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<OrchestratorState, OrchestratorError> {
        info!(
            process = %self.process.describe(),
            timezone = %self.engine.config().timezone(),
            poll_interval = %format_duration(self.poll_interval),
            "Orchestrator started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.terminate();
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(&cancel).await {
                        error!(error = %e, "Orchestrator stopping on fatal error");
                        self.state.phase = ProcessPhase::Terminated;
                        return Err(e);
                    }
                    if self.state.phase == ProcessPhase::Terminated {
                        break;
                    }
                }
            }
        }

        info!(launches = self.state.launches, "Orchestrator stopped");
        Ok(self.state)
    }

    /// Run a single control cycle and return the events it produced
    pub async fn poll_once(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<OrchestratorEvent>, OrchestratorError> {
        self.cycle_events.clear();
        self.cycle(cancel).await?;
        Ok(std::mem::take(&mut self.cycle_events))
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        if self.state.phase == ProcessPhase::Terminated {
            return Ok(());
        }
        if cancel.is_cancelled() {
            self.terminate();
            return Ok(());
        }

        let now = self.clock.now();
        let evaluation = self.engine.evaluate_detailed(now);
        let verdict = evaluation.verdict;

        debug!(
            verdict = %verdict,
            reason = %evaluation.reason,
            local_time = %evaluation.local,
            phase = ?self.state.phase,
            "Schedule evaluated"
        );

        if self.state.last_verdict != Some(verdict) {
            info!(
                previous = ?self.state.last_verdict,
                verdict = %verdict,
                reason = %evaluation.reason,
                local_time = %evaluation.local,
                "Schedule verdict changed"
            );
            self.emit(OrchestratorEvent::VerdictChanged {
                previous: self.state.last_verdict,
                current: verdict,
                reason: evaluation.reason,
                at: now,
            });
            self.state.last_verdict = Some(verdict);
        }
        self.state.desired_running = Some(verdict.allows_running());

        match self.state.phase {
            ProcessPhase::Terminated => Ok(()),
            ProcessPhase::NotStarted => self.establish(verdict, false, cancel).await,
            ProcessPhase::Running | ProcessPhase::Paused => {
                let process = Arc::clone(&self.process);
                let alive = match self
                    .attempt(Operation::IsAlive, cancel, || process.is_alive())
                    .await?
                {
                    Attempt::Done(alive) => alive,
                    Attempt::Abandoned => return Ok(()),
                    Attempt::Cancelled => {
                        self.terminate();
                        return Ok(());
                    }
                };
                self.state.last_known_alive = alive;

                if !alive {
                    warn!(
                        process = %self.process.describe(),
                        "Managed process is no longer alive, relaunching"
                    );
                    self.state.phase = ProcessPhase::NotStarted;
                    return self.establish(verdict, true, cancel).await;
                }

                match (self.state.phase, verdict) {
                    (ProcessPhase::Running, Verdict::Restricted) => self.pause(cancel).await,
                    (ProcessPhase::Paused, Verdict::Unrestricted) => self.resume(cancel).await,
                    _ => Ok(()),
                }
            }
        }
    }

    /// Launch the process and, if the verdict restricts it, pause it right away
    async fn establish(
        &mut self,
        verdict: Verdict,
        relaunch: bool,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let process = Arc::clone(&self.process);
        match self
            .attempt(Operation::Launch, cancel, || process.launch())
            .await?
        {
            Attempt::Done(()) => {}
            Attempt::Abandoned => return Ok(()),
            Attempt::Cancelled => {
                self.terminate();
                return Ok(());
            }
        }

        self.state.phase = ProcessPhase::Running;
        self.state.last_known_alive = true;
        self.state.launches += 1;
        info!(
            process = %self.process.describe(),
            launches = self.state.launches,
            relaunch,
            "Managed process launched"
        );
        self.emit(if relaunch {
            OrchestratorEvent::Relaunched
        } else {
            OrchestratorEvent::Launched
        });

        if verdict.is_restricted() {
            self.pause(cancel).await?;
        }
        Ok(())
    }

    async fn pause(&mut self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        let process = Arc::clone(&self.process);
        match self
            .attempt(Operation::Pause, cancel, || process.pause())
            .await?
        {
            Attempt::Done(()) => {
                self.state.phase = ProcessPhase::Paused;
                info!(process = %self.process.describe(), "Managed process paused");
                self.emit(OrchestratorEvent::Paused);
            }
            Attempt::Abandoned => {}
            Attempt::Cancelled => self.terminate(),
        }
        Ok(())
    }

    async fn resume(&mut self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        let process = Arc::clone(&self.process);
        match self
            .attempt(Operation::Resume, cancel, || process.resume())
            .await?
        {
            Attempt::Done(()) => {
                self.state.phase = ProcessPhase::Running;
                info!(process = %self.process.describe(), "Managed process resumed");
                self.emit(OrchestratorEvent::Resumed);
            }
            Attempt::Abandoned => {}
            Attempt::Cancelled => self.terminate(),
        }
        Ok(())
    }

    /// Issue `call` until it succeeds, the policy gives up, or `cancel` fires.
    ///
    /// Non-transient errors are returned as fatal without retrying.
    async fn attempt<T, F, Fut>(
        &mut self,
        operation: Operation,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<Attempt<T>, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProcessResult<T>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);

            let error = match call().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!(%operation, attempts, "Operation succeeded after retrying");
                    }
                    return Ok(Attempt::Done(value));
                }
                Err(e) if !e.is_transient() => {
                    return Err(OrchestratorError::Fatal {
                        operation,
                        source: e,
                    });
                }
                Err(e) => e,
            };

            if !self.retry.allows_retry(attempts) {
                warn!(
                    %operation,
                    attempts,
                    error = %error,
                    "Giving up on operation until next cycle"
                );
                self.emit(OrchestratorEvent::OperationAbandoned {
                    operation,
                    attempts,
                });
                return Ok(Attempt::Abandoned);
            }

            let delay = self.retry.delay_after(attempts);
            warn!(
                %operation,
                attempt = attempts,
                error = %error,
                retry_in = %format_duration(delay),
                "Operation failed, retrying"
            );

            if sleep_or_cancelled(cancel, delay).await {
                info!(%operation, "Cancelled while retrying");
                return Ok(Attempt::Cancelled);
            }
        }
    }

    fn terminate(&mut self) {
        if self.state.phase == ProcessPhase::Terminated {
            return;
        }
        info!(phase = ?self.state.phase, "Orchestrator terminating");
        self.state.phase = ProcessPhase::Terminated;
        self.emit(OrchestratorEvent::Terminated);
    }

    fn emit(&mut self, event: OrchestratorEvent) {
        if let Some(sink) = &self.events
            && sink.send(event.clone()).is_err()
        {
            debug!("Event receiver dropped");
            self.events = None;
        }
        self.cycle_events.push(event);
    }
}

/// Wait for `delay`, returning true if `cancel` fired first
async fn sleep_or_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    if cancel.is_cancelled() {
        return true;
    }
    if delay.is_zero() {
        // Let other tasks run so an unbounded zero-delay retry can still be cancelled
        tokio::task::yield_now().await;
        return cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use stricture_config::schedule_from_value;
    use stricture_host_api::{MockProcess, ProcessCall};
    use stricture_util::ManualClock;

    // 2024-05-03 is a Friday
    fn central(h: u32, m: u32) -> DateTime<Utc> {
        chrono_tz::US::Central
            .with_ymd_and_hms(2024, 5, 3, h, m, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn office_hours() -> Arc<ScheduleConfig> {
        Arc::new(
            schedule_from_value(json!({
                "timezone": "US/Central",
                "start_time": "09:00",
                "stop_time": "17:00"
            }))
            .unwrap(),
        )
    }

    fn make_orchestrator(start: DateTime<Utc>) -> (Orchestrator, MockProcess, ManualClock) {
        let process = MockProcess::new();
        let clock = ManualClock::new(start);
        let orchestrator = Orchestrator::new(office_hours(), Arc::new(process.clone()))
            .with_clock(Arc::new(clock.clone()))
            .with_retry_policy(RetryPolicy::immediate());
        (orchestrator, process, clock)
    }

    #[tokio::test]
    async fn test_unrestricted_start_launches_once() {
        let (mut orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let cancel = CancellationToken::new();

        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert!(matches!(
            events[0],
            OrchestratorEvent::VerdictChanged {
                previous: None,
                current: Verdict::Unrestricted,
                ..
            }
        ));
        assert_eq!(events[1], OrchestratorEvent::Launched);
        assert_eq!(orchestrator.state().phase, ProcessPhase::Running);
        assert_eq!(orchestrator.state().desired_running, Some(true));

        // Steady state only checks liveness
        for _ in 0..3 {
            let events = orchestrator.poll_once(&cancel).await.unwrap();
            assert!(events.is_empty());
        }
        assert_eq!(process.operations(), vec![ProcessCall::Launch]);
        assert_eq!(process.count(ProcessCall::IsAlive), 3);
    }

    #[tokio::test]
    async fn test_restricted_start_launches_then_pauses() {
        let (mut orchestrator, process, _clock) = make_orchestrator(central(20, 0));
        let cancel = CancellationToken::new();

        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert_eq!(&events[1..], &[OrchestratorEvent::Launched, OrchestratorEvent::Paused]);
        assert_eq!(orchestrator.state().phase, ProcessPhase::Paused);
        assert_eq!(process.operations(), vec![ProcessCall::Launch, ProcessCall::Pause]);
        assert!(process.state().paused);
    }

    #[tokio::test]
    async fn test_verdict_transitions_pause_and_resume() {
        let (mut orchestrator, process, clock) = make_orchestrator(central(16, 58));
        let cancel = CancellationToken::new();

        orchestrator.poll_once(&cancel).await.unwrap();
        clock.set(central(17, 0));
        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert_eq!(events.last(), Some(&OrchestratorEvent::Paused));
        assert_eq!(orchestrator.state().phase, ProcessPhase::Paused);

        // Still restricted: nothing to do
        clock.set(central(23, 0));
        assert!(orchestrator.poll_once(&cancel).await.unwrap().is_empty());

        clock.set(central(9, 0) + chrono::Duration::days(1));
        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert_eq!(events.last(), Some(&OrchestratorEvent::Resumed));
        assert_eq!(orchestrator.state().phase, ProcessPhase::Running);

        assert_eq!(
            process.operations(),
            vec![ProcessCall::Launch, ProcessCall::Pause, ProcessCall::Resume]
        );
    }

    #[tokio::test]
    async fn test_failed_pause_is_retried_without_interleaving() {
        let (mut orchestrator, process, clock) = make_orchestrator(central(12, 0));
        let cancel = CancellationToken::new();
        orchestrator.poll_once(&cancel).await.unwrap();

        process.fail_next(ProcessCall::Pause, 3);
        clock.set(central(18, 0));
        orchestrator.poll_once(&cancel).await.unwrap();

        assert_eq!(
            process.operations(),
            vec![
                ProcessCall::Launch,
                ProcessCall::Pause,
                ProcessCall::Pause,
                ProcessCall::Pause,
                ProcessCall::Pause
            ]
        );
        assert_eq!(orchestrator.state().phase, ProcessPhase::Paused);
    }

    #[tokio::test]
    async fn test_liveness_check_is_retried() {
        let (mut orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let cancel = CancellationToken::new();
        orchestrator.poll_once(&cancel).await.unwrap();

        process.fail_next(ProcessCall::IsAlive, 2);
        orchestrator.poll_once(&cancel).await.unwrap();

        assert_eq!(process.count(ProcessCall::IsAlive), 3);
        assert_eq!(process.operations(), vec![ProcessCall::Launch]);
        assert!(orchestrator.state().last_known_alive);
    }

    #[tokio::test]
    async fn test_dead_process_is_relaunched() {
        let (mut orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let cancel = CancellationToken::new();
        orchestrator.poll_once(&cancel).await.unwrap();

        process.simulate_exit();
        let events = orchestrator.poll_once(&cancel).await.unwrap();

        assert_eq!(events, vec![OrchestratorEvent::Relaunched]);
        assert_eq!(orchestrator.state().launches, 2);
        assert_eq!(orchestrator.state().phase, ProcessPhase::Running);
        assert_eq!(process.state().launches, 2);
    }

    #[tokio::test]
    async fn test_dead_process_relaunched_paused_when_restricted() {
        let (mut orchestrator, process, clock) = make_orchestrator(central(20, 0));
        let cancel = CancellationToken::new();
        orchestrator.poll_once(&cancel).await.unwrap();

        process.simulate_exit();
        clock.set(central(21, 0));
        let events = orchestrator.poll_once(&cancel).await.unwrap();

        assert_eq!(events, vec![OrchestratorEvent::Relaunched, OrchestratorEvent::Paused]);
        assert_eq!(
            process.operations(),
            vec![
                ProcessCall::Launch,
                ProcessCall::Pause,
                ProcessCall::Launch,
                ProcessCall::Pause
            ]
        );
        assert_eq!(orchestrator.state().phase, ProcessPhase::Paused);
    }

    #[tokio::test]
    async fn test_bounded_retry_abandons_until_next_cycle() {
        let (orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let mut orchestrator =
            orchestrator.with_retry_policy(RetryPolicy::immediate().with_max_attempts(2));
        let cancel = CancellationToken::new();

        process.fail_next(ProcessCall::Launch, 3);
        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert!(events.contains(&OrchestratorEvent::OperationAbandoned {
            operation: Operation::Launch,
            attempts: 2,
        }));
        assert_eq!(orchestrator.state().phase, ProcessPhase::NotStarted);
        assert_eq!(orchestrator.state().launches, 0);

        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert_eq!(events, vec![OrchestratorEvent::Launched]);
        assert_eq!(process.count(ProcessCall::Launch), 4);
    }

    #[tokio::test]
    async fn test_rejected_operation_is_fatal() {
        let (mut orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let cancel = CancellationToken::new();

        process.fail_next_with(ProcessCall::Launch, ProcessError::rejected("status 500"));
        let err = orchestrator.poll_once(&cancel).await.unwrap_err();

        let OrchestratorError::Fatal { operation, source } = err;
        assert_eq!(operation, Operation::Launch);
        assert_eq!(source, ProcessError::rejected("status 500"));
        assert_eq!(process.count(ProcessCall::Launch), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_retry_wait() {
        let (orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let mut orchestrator =
            orchestrator.with_retry_policy(RetryPolicy::fixed(Duration::from_secs(3600)));
        let cancel = CancellationToken::new();

        process.fail_next(ProcessCall::Launch, 1);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let events = tokio::time::timeout(Duration::from_secs(5), orchestrator.poll_once(&cancel))
            .await
            .expect("retry wait should observe cancellation")
            .unwrap();

        assert_eq!(events.last(), Some(&OrchestratorEvent::Terminated));
        assert_eq!(orchestrator.state().phase, ProcessPhase::Terminated);
        assert_eq!(process.count(ProcessCall::Launch), 1);

        // A terminated orchestrator issues nothing further
        assert!(orchestrator.poll_once(&cancel).await.unwrap().is_empty());
        assert_eq!(process.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_cycle() {
        let (mut orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let events = orchestrator.poll_once(&cancel).await.unwrap();
        assert_eq!(events, vec![OrchestratorEvent::Terminated]);
        assert!(process.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let (orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = orchestrator
            .with_poll_interval(Duration::from_millis(10))
            .with_event_sink(tx);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(orchestrator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();

        let state = handle.await.unwrap().unwrap();
        assert_eq!(state.phase, ProcessPhase::Terminated);
        assert_eq!(state.launches, 1);
        assert!(process.count(ProcessCall::IsAlive) >= 1);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events[0], OrchestratorEvent::VerdictChanged { .. }));
        assert_eq!(events[1], OrchestratorEvent::Launched);
        assert_eq!(events.last(), Some(&OrchestratorEvent::Terminated));
    }

    #[tokio::test]
    async fn test_run_returns_fatal_error() {
        let (orchestrator, process, _clock) = make_orchestrator(central(12, 0));
        process.fail_next_with(ProcessCall::Launch, ProcessError::rejected("no"));

        let result = orchestrator.run(CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::Fatal {
                operation: Operation::Launch,
                ..
            })
        ));
    }
}
