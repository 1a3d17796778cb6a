use crate::engine::{self, ExitPoll, StartupPoll};
use crate::health::HealthChecker;
use crate::state::{SharedState, Stage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Supervision loop timings. The defaults are the canonical kiosk
/// values; tests shrink them to keep runs fast.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// How long to wait for the first sign of life after a launch.
    pub startup_window: Duration,
    /// Grace period after startup before the first health check; the
    /// progress counter is not meaningful right after spawn.
    pub warmup: Duration,
    /// Fixed delay before retrying a failed launch.
    pub retry_delay: Duration,
    /// Steady-loop tick: exit poll + health check + cycle flag.
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            startup_window: Duration::from_secs(10),
            warmup: Duration::from_secs(10),
            retry_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Circular advance through the rotation list.
pub fn next_index(index: usize, len: usize) -> usize {
    (index + 1) % len
}

/// Stream cycle timer: sets the shared flag once per interval. Runs
/// concurrently with the supervisor and never looks at player state.
/// The flag is edge-triggered; setting it again before the supervisor
/// consumes it still counts as a single pending cycle.
pub async fn run_cycler(flag: Arc<AtomicBool>, interval: Duration) {
    loop {
        sleep(interval).await;
        debug!("Setting stream cycle flag.");
        flag.store(true, Ordering::SeqCst);
    }
}

/// Best-effort loop that keeps the player always watching the current
/// stream, restarting it on any failure and cycling through the
/// rotation list when the cycle flag is raised.
///
/// Every recoverable failure (spawn error, startup timeout, unexpected
/// exit, failed health check) is retried after a fixed delay, forever;
/// only the external shutdown signal ends supervision.
pub async fn run(state: SharedState, cycle_flag: Option<Arc<AtomicBool>>, timings: Timings) {
    let mut health = HealthChecker::new(state.config.probe_cmd.clone());
    let streams = &state.config.streams;
    let mut index = 0usize;

    info!(
        "Starting {:?}-mode supervision loop over {} stream(s)...",
        state.config.mode,
        streams.len()
    );
    loop {
        let stream = &streams[index];
        health.reset();

        info!(
            "Launching {} player with stream '{}'...",
            state.config.player.to_uppercase(),
            stream
        );
        state.status.set(Stage::Launching, stream);
        let command = state.config.player_command(stream);
        let mut output = match engine::launch(&state, &command) {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    "Launch error, will retry in {}s - {}",
                    timings.retry_delay.as_secs(),
                    e
                );
                state.status.set(Stage::LaunchFail, stream);
                sleep(timings.retry_delay).await;
                continue;
            }
        };

        if engine::poll_startup(&mut output, timings.startup_window).await == StartupPoll::TimedOut {
            warn!(
                "The player did not start, will retry in {}s.",
                timings.retry_delay.as_secs()
            );
            state.status.set(Stage::LaunchFail, stream);
            engine::terminate(&state, false).await;
            sleep(timings.retry_delay).await;
            continue;
        }
        engine::spawn_drain(output);

        info!("The player is now running.");
        state.status.set(Stage::Playing, stream);
        // Must wait until the stream is up before trusting the probe.
        sleep(timings.warmup).await;

        // Steady loop: keep going while the process is alive, the
        // probe reports progress, and no stream cycle is due.
        let mut cycle_due = false;
        loop {
            if let Some(flag) = &cycle_flag {
                if flag.swap(false, Ordering::SeqCst) {
                    debug!("Honouring stream cycle flag.");
                    cycle_due = true;
                    break;
                }
            }
            if engine::poll_exit(&state) == ExitPoll::Exited {
                break;
            }
            if !health.check().await {
                break;
            }
            sleep(timings.poll_interval).await;
        }

        state.status.set(Stage::Stopped, stream);
        if cycle_due {
            info!("Stream has played for long enough, will cycle to next one.");
            engine::terminate(&state, false).await;
            index = next_index(index, streams.len());
        } else {
            // A hung-but-alive player must be gone before the relaunch
            // takes the video output; index stays on the same stream.
            warn!("The player has stopped, will attempt to restart it.");
            engine::terminate(&state, false).await;
        }
    }
}
