use crate::config::{Mode, WatchConfig};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::process::Child;

/// Supervision stage exposed over the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Booting,
    Launching,
    Playing,
    LaunchFail,
    Stopped,
}

/// One consistent status record, as served to external monitors.
///
/// The `status` key name matches the wire format the kiosk dashboards
/// already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    #[serde(rename = "status")]
    pub stage: Stage,
    pub stream: Option<String>,
    pub mode: Mode,
}

/// Single source of truth for externally observable state.
///
/// Written only by the supervisor loop; read by the HTTP handlers. The
/// stage and stream are replaced together under one lock so a reader
/// never observes a stage from one transition paired with the stream
/// of another.
pub struct StatusStore {
    inner: Mutex<StatusSnapshot>,
}

impl StatusStore {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: Mutex::new(StatusSnapshot {
                stage: Stage::Booting,
                stream: None,
                mode,
            }),
        }
    }

    /// Atomically replaces the stage and current stream.
    pub fn set(&self, stage: Stage, stream: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.stage = stage;
        inner.stream = Some(stream.to_string());
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.lock().unwrap().clone()
    }
}

/// Runtime handle for the one live player process.
pub struct PlayerRuntime {
    /// Player child process.
    pub process: Child,
    /// Rendered launch command (for log messages).
    pub command: String,
    /// Launch time.
    pub started_at: Instant,
}

/// Global application context shared between the supervisor loop, the
/// signal handler and the HTTP server.
pub struct AppState {
    pub config: WatchConfig,
    pub status: StatusStore,
    /// The current player handle; `None` between launches. At most one
    /// live handle exists, and it is replaced only after the previous
    /// process has been terminated or observed exited.
    pub player: Mutex<Option<PlayerRuntime>>,
}

impl AppState {
    pub fn new(config: WatchConfig) -> Self {
        let mode = config.mode;
        Self {
            config,
            status: StatusStore::new(mode),
            player: Mutex::new(None),
        }
    }
}

pub type SharedState = Arc<AppState>;
