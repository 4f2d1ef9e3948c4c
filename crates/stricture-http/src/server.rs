//! Counting service
//!
//! Every launch starts a counter task that ticks once per period while not
//! paused and finishes on reaching its limit. All counters live in a
//! registry owned by a single supervisor task; HTTP handlers talk to it
//! through a command channel.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::{
    LAUNCH_PATH, LaunchResponse, MessageResponse, PAUSE_PATH, ProcessRequest, RESUME_PATH,
    STATUS_PATH, StatusQuery, StatusResponse,
};

/// Counters finish after this many ticks
pub const DEFAULT_COUNT_LIMIT: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSettings {
    pub tick: Duration,
    pub limit: u64,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            limit: DEFAULT_COUNT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("counter registry has shut down")]
pub struct RegistryClosed;

#[derive(Debug)]
enum Command {
    Launch {
        reply: oneshot::Sender<String>,
    },
    Pause {
        process_id: String,
        reply: oneshot::Sender<bool>,
    },
    Resume {
        process_id: String,
        reply: oneshot::Sender<bool>,
    },
    Status {
        process_id: String,
        reply: oneshot::Sender<Option<u64>>,
    },
    Held {
        reply: oneshot::Sender<usize>,
    },
}

struct Counter {
    elapsed: Arc<AtomicU64>,
    paused: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Counter {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Handle to the supervisor task owning every counter
#[derive(Debug, Clone)]
pub struct CounterRegistry {
    commands: mpsc::Sender<Command>,
}

impl CounterRegistry {
    /// Start the supervisor. It stops, taking its counters with it, when
    /// `cancel` fires or every handle is dropped.
    pub fn spawn(settings: CounterSettings, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(supervise(rx, settings, cancel));
        Self { commands: tx }
    }

    /// Start a new counter and return its id
    pub async fn launch(&self) -> Result<String, RegistryClosed> {
        self.request(|reply| Command::Launch { reply }).await
    }

    /// Returns false if the counter is unknown or finished
    pub async fn pause(&self, process_id: &str) -> Result<bool, RegistryClosed> {
        let process_id = process_id.to_string();
        self.request(|reply| Command::Pause { process_id, reply }).await
    }

    /// Returns false if the counter is unknown or finished
    pub async fn resume(&self, process_id: &str) -> Result<bool, RegistryClosed> {
        let process_id = process_id.to_string();
        self.request(|reply| Command::Resume { process_id, reply }).await
    }

    /// Elapsed ticks of a live counter
    pub async fn status(&self, process_id: &str) -> Result<Option<u64>, RegistryClosed> {
        let process_id = process_id.to_string();
        self.request(|reply| Command::Status { process_id, reply })
            .await
    }

    /// Number of counters the registry still holds
    pub async fn held(&self) -> Result<usize, RegistryClosed> {
        self.request(|reply| Command::Held { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RegistryClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| RegistryClosed)?;
        response.await.map_err(|_| RegistryClosed)
    }
}

async fn supervise(
    mut commands: mpsc::Receiver<Command>,
    settings: CounterSettings,
    cancel: CancellationToken,
) {
    let mut counters: HashMap<String, Counter> = HashMap::new();

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Launch { reply } => {
                counters.retain(|_, counter| counter.is_alive());
                let process_id = Uuid::new_v4().to_string();
                let elapsed = Arc::new(AtomicU64::new(0));
                let paused = Arc::new(AtomicBool::new(false));
                let task = tokio::spawn(count(
                    Arc::clone(&elapsed),
                    Arc::clone(&paused),
                    settings,
                ));
                info!(process_id = %process_id, "Counting process launched");
                counters.insert(
                    process_id.clone(),
                    Counter {
                        elapsed,
                        paused,
                        task,
                    },
                );
                let _ = reply.send(process_id);
            }
            Command::Pause { process_id, reply } => {
                let found = set_paused(&mut counters, &process_id, true);
                let _ = reply.send(found);
            }
            Command::Resume { process_id, reply } => {
                let found = set_paused(&mut counters, &process_id, false);
                let _ = reply.send(found);
            }
            Command::Status { process_id, reply } => {
                let elapsed =
                    live(&mut counters, &process_id).map(|c| c.elapsed.load(Ordering::Relaxed));
                let _ = reply.send(elapsed);
            }
            Command::Held { reply } => {
                let _ = reply.send(counters.len());
            }
        }
    }

    for counter in counters.values() {
        counter.task.abort();
    }
    debug!(count = counters.len(), "Counter registry stopped");
}

/// Look up a running counter, dropping it from the registry if it has finished
fn live<'a>(counters: &'a mut HashMap<String, Counter>, process_id: &str) -> Option<&'a Counter> {
    if counters.get(process_id).is_some_and(|c| !c.is_alive()) {
        counters.remove(process_id);
        debug!(process_id, "Finished counter removed");
    }
    counters.get(process_id)
}

fn set_paused(counters: &mut HashMap<String, Counter>, process_id: &str, paused: bool) -> bool {
    match live(counters, process_id) {
        Some(counter) => {
            counter.paused.store(paused, Ordering::Relaxed);
            info!(process_id, paused, "Counting process updated");
            true
        }
        None => false,
    }
}

async fn count(elapsed: Arc<AtomicU64>, paused: Arc<AtomicBool>, settings: CounterSettings) {
    let mut ticker = tokio::time::interval(settings.tick);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if paused.load(Ordering::Relaxed) {
            continue;
        }
        if elapsed.fetch_add(1, Ordering::Relaxed) + 1 >= settings.limit {
            debug!(limit = settings.limit, "Counting process finished");
            return;
        }
    }
}

/// Handler errors, rendered as a JSON message
#[derive(Debug)]
pub enum ApiError {
    MissingProcessId,
    UnknownProcess,
    NotActive,
    Unavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingProcessId => (StatusCode::BAD_REQUEST, "Invalid process ID."),
            ApiError::UnknownProcess => (
                StatusCode::BAD_REQUEST,
                "Invalid process ID or process not found.",
            ),
            ApiError::NotActive => (
                StatusCode::BAD_REQUEST,
                "Counting process not active or completed.",
            ),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Counting service is shutting down.",
            ),
        };
        (status, Json(MessageResponse::new(message))).into_response()
    }
}

impl From<RegistryClosed> for ApiError {
    fn from(_: RegistryClosed) -> Self {
        ApiError::Unavailable
    }
}

type HandlerResult<T> = Result<Json<T>, ApiError>;

/// GET /api/launch
async fn launch(State(registry): State<CounterRegistry>) -> HandlerResult<LaunchResponse> {
    let process_id = registry.launch().await?;
    Ok(Json(LaunchResponse {
        message: "Counting process launched.".to_string(),
        process_id,
    }))
}

/// POST /api/pause
async fn pause(
    State(registry): State<CounterRegistry>,
    Json(request): Json<ProcessRequest>,
) -> HandlerResult<MessageResponse> {
    let process_id = request.process_id.ok_or(ApiError::UnknownProcess)?;
    if !registry.pause(&process_id).await? {
        return Err(ApiError::UnknownProcess);
    }
    Ok(Json(MessageResponse::new("Counting process paused.")))
}

/// POST /api/resume
async fn resume(
    State(registry): State<CounterRegistry>,
    Json(request): Json<ProcessRequest>,
) -> HandlerResult<MessageResponse> {
    let process_id = request.process_id.ok_or(ApiError::UnknownProcess)?;
    if !registry.resume(&process_id).await? {
        return Err(ApiError::UnknownProcess);
    }
    Ok(Json(MessageResponse::new("Counting process resumed.")))
}

/// GET /api/status?process_id=
async fn status(
    State(registry): State<CounterRegistry>,
    Query(query): Query<StatusQuery>,
) -> HandlerResult<StatusResponse> {
    let process_id = query.process_id.ok_or(ApiError::MissingProcessId)?;
    let elapsed = registry
        .status(&process_id)
        .await?
        .ok_or(ApiError::NotActive)?;
    Ok(Json(StatusResponse {
        elapsed_time_seconds: elapsed,
    }))
}

pub fn router(registry: CounterRegistry) -> Router {
    Router::new()
        .route(LAUNCH_PATH, get(launch))
        .route(PAUSE_PATH, post(pause))
        .route(RESUME_PATH, post(resume))
        .route(STATUS_PATH, get(status))
        .with_state(registry)
}

/// Serve the counting service on `listener` until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    settings: CounterSettings,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let registry = CounterRegistry::spawn(settings, cancel.child_token());
    let app = router(registry);

    info!(addr = %listener.local_addr()?, "Counting service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("Counting service shutting down");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(limit: u64) -> CounterSettings {
        CounterSettings {
            tick: Duration::from_millis(5),
            limit,
        }
    }

    #[tokio::test]
    async fn test_launch_and_count() {
        let registry = CounterRegistry::spawn(fast(DEFAULT_COUNT_LIMIT), CancellationToken::new());
        let id = registry.launch().await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let elapsed = registry.status(&id).await.unwrap().unwrap();
        assert!(elapsed > 0);
    }

    #[tokio::test]
    async fn test_paused_counter_stands_still() {
        let registry = CounterRegistry::spawn(fast(DEFAULT_COUNT_LIMIT), CancellationToken::new());
        let id = registry.launch().await.unwrap();

        assert!(registry.pause(&id).await.unwrap());
        let before = registry.status(&id).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let after = registry.status(&id).await.unwrap().unwrap();
        // A tick already in flight when the pause landed may still count
        assert!(after <= before + 1);

        assert!(registry.resume(&id).await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.status(&id).await.unwrap().unwrap() > after);
    }

    #[tokio::test]
    async fn test_unknown_process() {
        let registry = CounterRegistry::spawn(fast(10), CancellationToken::new());
        assert!(!registry.pause("nope").await.unwrap());
        assert!(!registry.resume("nope").await.unwrap());
        assert_eq!(registry.status("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_finished_counter_is_not_alive() {
        let registry = CounterRegistry::spawn(fast(3), CancellationToken::new());
        let id = registry.launch().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.status(&id).await.unwrap(), None);
        assert!(!registry.pause(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_finished_counters_are_dropped() {
        let registry = CounterRegistry::spawn(fast(3), CancellationToken::new());
        let first = registry.launch().await.unwrap();
        let second = registry.launch().await.unwrap();
        assert_eq!(registry.held().await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.status(&first).await.unwrap(), None);
        assert_eq!(registry.held().await.unwrap(), 1);

        // A launch sweeps whatever else has finished
        let third = registry.launch().await.unwrap();
        assert_ne!(third, second);
        assert_eq!(registry.held().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_registry_reports_closed() {
        let cancel = CancellationToken::new();
        let registry = CounterRegistry::spawn(fast(10), cancel.clone());
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(registry.launch().await.is_err());
    }
}
