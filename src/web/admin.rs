use crate::state::{SharedState, StatusSnapshot};
use axum::{extract::State, Json};
use tracing::{info, warn};

/// Read-only supervision status for external monitors.
/// Returns the current stage, stream and mode as one consistent record.
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusSnapshot> {
    Json(state.status.snapshot())
}

/// System status API: memory and load for the kiosk dashboard.
pub async fn sys_status() -> Json<serde_json::Value> {
    let mem = sys_info::mem_info()
        .map(|m| (m.total, m.avail))
        .unwrap_or((0, 0));
    let load = sys_info::loadavg().map(|l| l.one).unwrap_or(0.0);

    Json(serde_json::json!({
        "mem_total": mem.0 / 1024, // MB
        "mem_avail": mem.1 / 1024, // MB
        "load_avg": load,
    }))
}

/// Device reboot API. Fire-and-forget invocation of the OS reboot
/// command, fully decoupled from the supervision loop.
pub async fn do_reboot() -> &'static str {
    info!("Reboot requested over HTTP.");
    if let Err(e) = tokio::process::Command::new("reboot").spawn() {
        warn!("Failed to invoke reboot: {}", e);
    }
    ""
}
