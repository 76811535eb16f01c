//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ActivityRequest, GeneratedActivity};
use crate::events::BuildEvent;
use crate::orchestrator::{BatchProgress, BatchStatus, BuildOutcome};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Progress,
    StopBatch,
}

/// Messages the server sends over WebSocket. Build events are pushed
/// unprompted as `{"type": "event", ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Progress(ProgressOut),
    Stopped { stopped: bool },
    Event(BuildEvent),
    Error { message: String },
}

// ---------- HTTP DTOs ----------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub generator: String,
    pub storage_usage_percent: f64,
}

#[derive(Debug, Deserialize)]
pub struct BatchIn {
    pub activities: Vec<ActivityRequest>,
}

#[derive(Debug, Serialize)]
pub struct StopOut {
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressOut {
    pub status: BatchStatus,
    pub running: bool,
    pub progress: BatchProgress,
}

#[derive(Debug, Serialize)]
pub struct BuildOneOut {
    pub activity: GeneratedActivity,
    pub outcome: BuildOutcome,
}

#[derive(Debug, Serialize)]
pub struct ClearOut {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}
