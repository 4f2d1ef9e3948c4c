//! Controllable process backed by the counting service

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use stricture_host_api::{ControllableProcess, ProcessError, ProcessResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{
    LAUNCH_PATH, LaunchResponse, PAUSE_PATH, ProcessRequest, RESUME_PATH, STATUS_PATH,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one counter of a counting service over HTTP.
///
/// The id returned by the latest launch is remembered and used for every
/// later pause, resume and liveness request.
pub struct HttpProcess {
    client: Client,
    base_url: String,
    process_id: Mutex<Option<String>>,
}

impl HttpProcess {
    pub fn new(endpoint: &str) -> ProcessResult<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> ProcessResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProcessError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            process_id: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Id of the most recently launched counter
    pub async fn process_id(&self) -> Option<String> {
        self.process_id.lock().await.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a pause or resume request. Any HTTP response counts as delivered.
    async fn post_command(&self, path: &str) -> ProcessResult<()> {
        let body = ProcessRequest {
            process_id: self.process_id().await,
        };

        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| unreachable(path, e))?;

        let status = response.status();
        if status.is_success() {
            debug!(path, "Request delivered");
        } else {
            warn!(path, status = %status, "Request delivered but not accepted");
        }
        Ok(())
    }
}

fn unreachable(path: &str, error: reqwest::Error) -> ProcessError {
    ProcessError::unreachable(format!("{}: {}", path, error))
}

#[async_trait]
impl ControllableProcess for HttpProcess {
    async fn launch(&self) -> ProcessResult<()> {
        let response = self
            .client
            .get(self.url(LAUNCH_PATH))
            .send()
            .await
            .map_err(|e| unreachable(LAUNCH_PATH, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProcessError::unavailable(format!(
                "launch returned {}",
                status
            )));
        }
        if status != StatusCode::OK {
            return Err(ProcessError::rejected(format!(
                "launch returned {}",
                status
            )));
        }

        let launched: LaunchResponse = response
            .json()
            .await
            .map_err(|e| ProcessError::rejected(format!("malformed launch response: {}", e)))?;

        info!(process_id = %launched.process_id, endpoint = %self.base_url, "Counter launched");
        *self.process_id.lock().await = Some(launched.process_id);
        Ok(())
    }

    async fn pause(&self) -> ProcessResult<()> {
        self.post_command(PAUSE_PATH).await
    }

    async fn resume(&self) -> ProcessResult<()> {
        self.post_command(RESUME_PATH).await
    }

    async fn is_alive(&self) -> ProcessResult<bool> {
        let Some(process_id) = self.process_id().await else {
            return Ok(false);
        };

        let response = self
            .client
            .get(self.url(STATUS_PATH))
            .query(&[("process_id", process_id.as_str())])
            .send()
            .await
            .map_err(|e| unreachable(STATUS_PATH, e))?;

        // 400 means the counter is unknown or finished
        let status = response.status();
        if status.is_server_error() {
            return Err(ProcessError::unavailable(format!(
                "status returned {}",
                status
            )));
        }

        let alive = status == StatusCode::OK;
        if alive && let Ok(body) = response.text().await {
            debug!(process_id = %process_id, status = %body.trim(), "Counter status");
        }
        Ok(alive)
    }

    fn describe(&self) -> String {
        format!("counter at {}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{self, CounterSettings};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    async fn start_service(settings: CounterSettings) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(server::serve(listener, settings, cancel.clone()));
        (addr, cancel)
    }

    #[tokio::test]
    async fn test_drives_counter_over_http() {
        let (addr, cancel) = start_service(CounterSettings {
            tick: Duration::from_millis(5),
            limit: server::DEFAULT_COUNT_LIMIT,
        })
        .await;
        let process = HttpProcess::new(&format!("http://{}/", addr)).unwrap();

        assert!(!process.is_alive().await.unwrap());

        process.launch().await.unwrap();
        assert!(process.process_id().await.is_some());
        assert!(process.is_alive().await.unwrap());

        process.pause().await.unwrap();
        process.pause().await.unwrap();
        assert!(process.is_alive().await.unwrap());
        process.resume().await.unwrap();

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_finished_counter_reports_dead() {
        let (addr, cancel) = start_service(CounterSettings {
            tick: Duration::from_millis(5),
            limit: 2,
        })
        .await;
        let process = HttpProcess::new(&format!("http://{}", addr)).unwrap();

        process.launch().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!process.is_alive().await.unwrap());

        // Pausing a finished counter gets a 400 but still counts as delivered
        process.pause().await.unwrap();
        // Its id is still remembered; the status 400 means dead, not an error
        assert!(process.process_id().await.is_some());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        // Bind and drop to find a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let process =
            HttpProcess::with_timeout(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();

        let err = process.launch().await.unwrap_err();
        assert!(err.is_transient());
        assert!(process.pause().await.unwrap_err().is_transient());
    }

    /// Serve a fixed status on the launch and status paths
    async fn start_fixed(status: axum::http::StatusCode) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route(LAUNCH_PATH, axum::routing::get(move || async move { status }))
            .route(STATUS_PATH, axum::routing::get(move || async move { status }));
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr
    }

    #[tokio::test]
    async fn test_refused_launch_is_rejected() {
        let addr = start_fixed(axum::http::StatusCode::FORBIDDEN).await;

        let process = HttpProcess::new(&format!("http://{}", addr)).unwrap();
        let err = process.launch().await.unwrap_err();
        assert!(matches!(err, ProcessError::Rejected(_)));
        assert!(!err.is_transient());
        assert!(process.process_id().await.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_service_is_transient() {
        let addr = start_fixed(axum::http::StatusCode::SERVICE_UNAVAILABLE).await;

        let process = HttpProcess::new(&format!("http://{}", addr)).unwrap();
        let err = process.launch().await.unwrap_err();
        assert!(matches!(err, ProcessError::Unavailable(_)));
        assert!(err.is_transient());
        assert!(process.process_id().await.is_none());

        *process.process_id.lock().await = Some("known".to_string());
        let err = process.is_alive().await.unwrap_err();
        assert!(matches!(err, ProcessError::Unavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_internal_server_error_is_transient() {
        let addr = start_fixed(axum::http::StatusCode::INTERNAL_SERVER_ERROR).await;

        let process = HttpProcess::new(&format!("http://{}", addr)).unwrap();
        assert!(process.launch().await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_endpoint_trailing_slash_is_dropped() {
        let process = HttpProcess::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(process.endpoint(), "http://127.0.0.1:5000");
        assert_eq!(process.url(LAUNCH_PATH), "http://127.0.0.1:5000/api/launch");
    }
}
