use crate::state::{AppState, PlayerRuntime};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, error, info, warn};

/// How long a graceful stop waits for the player to exit before the
/// supervisor moves on. Keeps terminate bounded; the old process must
/// be gone before a new one takes the video output.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Captured output pipes of the current player, used only to detect
/// the first sign of life during startup. After that they are handed
/// to a background drain so the player never blocks on a full pipe.
pub struct PlayerOutput {
    stdout: ChildStdout,
    stderr: ChildStderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPoll {
    Started,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPoll {
    StillRunning,
    Exited,
}

/// Spawns the player with the rendered launch command and installs it
/// as the current handle.
///
/// A spawn failure (missing binary, bad permissions) is returned as an
/// error for the caller to classify as a retryable launch failure; it
/// must never tear down the supervisor.
pub fn launch(state: &Arc<AppState>, command: &str) -> anyhow::Result<PlayerOutput> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty player command"))?;

    let mut cmd = Command::new(program);
    cmd.args(parts);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn player process: {}", e);
        e
    })?;

    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");

    {
        let mut player = state.player.lock().unwrap();
        // Invariant: the previous handle was terminated or observed
        // exited before a relaunch.
        debug_assert!(player.is_none());
        *player = Some(PlayerRuntime {
            process: child,
            command: command.to_string(),
            started_at: Instant::now(),
        });
    }

    Ok(PlayerOutput { stdout, stderr })
}

/// Waits up to `window` for the first sign of life from the player:
/// any byte on stdout or stderr, or EOF (termination also counts; the
/// steady loop classifies an early exit right after). Silence for the
/// whole window means the player never came up.
pub async fn poll_startup(output: &mut PlayerOutput, window: Duration) -> StartupPoll {
    let mut stdout_buf = [0u8; 256];
    let mut stderr_buf = [0u8; 256];
    tokio::select! {
        _ = tokio::time::sleep(window) => StartupPoll::TimedOut,
        _ = output.stdout.read(&mut stdout_buf) => StartupPoll::Started,
        _ = output.stderr.read(&mut stderr_buf) => StartupPoll::Started,
    }
}

/// Hands the output pipes to a background task that discards them for
/// the lifetime of the process.
pub fn spawn_drain(output: PlayerOutput) {
    tokio::spawn(async move {
        let mut stdout = output.stdout;
        let mut stderr = output.stderr;
        let mut stdout_sink = tokio::io::sink();
        let mut stderr_sink = tokio::io::sink();
        let _ = tokio::join!(
            tokio::io::copy(&mut stdout, &mut stdout_sink),
            tokio::io::copy(&mut stderr, &mut stderr_sink),
        );
    });
}

/// Non-blocking check of the current handle. Removes the handle when
/// the process has exited so a relaunch can take its place.
pub fn poll_exit(state: &Arc<AppState>) -> ExitPoll {
    let mut player = state.player.lock().unwrap();
    match player.as_mut() {
        None => ExitPoll::Exited,
        Some(runtime) => match runtime.process.try_wait() {
            Ok(Some(status)) => {
                warn!("Player exited with {}", status);
                *player = None;
                ExitPoll::Exited
            }
            Ok(None) => ExitPoll::StillRunning,
            Err(e) => {
                error!("Process monitor error: {}", e);
                ExitPoll::StillRunning
            }
        },
    }
}

/// Best-effort stop of the current handle; a no-op when none exists.
///
/// Forced termination (shutdown signal) kills outright. A graceful
/// stop (deliberate stream cycle) also kills, then waits a bounded
/// grace period for the exit so launches never overlap on the single
/// video output.
pub async fn terminate(state: &Arc<AppState>, force: bool) {
    let runtime = state.player.lock().unwrap().take();
    let Some(mut runtime) = runtime else {
        debug!("Player is not running, nothing to stop.");
        return;
    };

    if force {
        let _ = runtime.process.kill().await;
        info!(
            "Force-stopped '{}' after {}s.",
            runtime.command,
            runtime.started_at.elapsed().as_secs()
        );
        return;
    }

    let _ = runtime.process.start_kill();
    match tokio::time::timeout(STOP_GRACE, runtime.process.wait()).await {
        Ok(_) => info!(
            "Player stopped after {}s.",
            runtime.started_at.elapsed().as_secs()
        ),
        Err(_) => warn!("Player did not exit within the stop grace period."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, WatchConfig};

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(WatchConfig {
            player: "omx".to_string(),
            command_template: "{url}".to_string(),
            streams: vec!["rtsp://cam/1".to_string()],
            mode: Mode::Single,
            cycle_secs: None,
            probe_cmd: vec!["true".to_string()],
        }))
    }

    async fn wait_for_exit(state: &Arc<AppState>) -> ExitPoll {
        for _ in 0..100 {
            if poll_exit(state) == ExitPoll::Exited {
                return ExitPoll::Exited;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        ExitPoll::StillRunning
    }

    #[tokio::test]
    async fn launch_failure_leaves_no_handle_behind() {
        let state = test_state();
        let result = launch(&state, "definitely-not-a-player-binary --foo");
        assert!(result.is_err());
        assert!(state.player.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn launch_installs_a_handle_and_terminate_removes_it() {
        let state = test_state();
        let _output = launch(&state, "sleep 30").unwrap();
        assert!(state.player.lock().unwrap().is_some());
        assert_eq!(poll_exit(&state), ExitPoll::StillRunning);

        terminate(&state, true).await;
        assert!(state.player.lock().unwrap().is_none());
        assert_eq!(poll_exit(&state), ExitPoll::Exited);
    }

    #[tokio::test]
    async fn terminate_without_a_handle_is_a_no_op() {
        let state = test_state();
        terminate(&state, true).await;
        terminate(&state, false).await;
    }

    #[tokio::test]
    async fn startup_poll_sees_output_as_a_sign_of_life() {
        let state = test_state();
        let mut output = launch(&state, "seq 100000").unwrap();
        let poll = poll_startup(&mut output, Duration::from_secs(5)).await;
        assert_eq!(poll, StartupPoll::Started);
        spawn_drain(output);
        terminate(&state, true).await;
    }

    #[tokio::test]
    async fn startup_poll_times_out_on_a_silent_player() {
        let state = test_state();
        let mut output = launch(&state, "sleep 30").unwrap();
        let poll = poll_startup(&mut output, Duration::from_millis(150)).await;
        assert_eq!(poll, StartupPoll::TimedOut);
        terminate(&state, true).await;
    }

    #[tokio::test]
    async fn exit_poll_reports_a_finished_player() {
        let state = test_state();
        let output = launch(&state, "true").unwrap();
        spawn_drain(output);
        assert_eq!(wait_for_exit(&state).await, ExitPoll::Exited);
        assert!(state.player.lock().unwrap().is_none());
    }
}
