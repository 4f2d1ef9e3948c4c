//! Wire types shared by the counting service and its client

use serde::{Deserialize, Serialize};

pub const LAUNCH_PATH: &str = "/api/launch";
pub const PAUSE_PATH: &str = "/api/pause";
pub const RESUME_PATH: &str = "/api/resume";
pub const STATUS_PATH: &str = "/api/status";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub message: String,
    pub process_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of pause and resume requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub process_id: Option<String>,
}

/// Query of status requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub process_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub elapsed_time_seconds: u64,
}
