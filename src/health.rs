use regex::Regex;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

/// Decides whether the running player is actually making forward
/// progress, independent of whether its OS process is alive (a hung
/// player can stay alive but frozen).
///
/// The probe is an external status query whose stdout carries a
/// `Duration: <n>` line. The player counts as healthy only while that
/// number keeps strictly increasing between checks. Every probe
/// failure degrades to unhealthy; `check` never errors out.
pub struct HealthChecker {
    probe_cmd: Vec<String>,
    last_duration: u64,
}

impl HealthChecker {
    pub fn new(probe_cmd: Vec<String>) -> Self {
        Self {
            probe_cmd,
            last_duration: 0,
        }
    }

    /// Resets the progress baseline. Called at every player launch so a
    /// relaunch is not compared against the previous process's sample.
    pub fn reset(&mut self) {
        self.last_duration = 0;
    }

    /// Runs the probe once and compares the reported progress against
    /// the last recorded sample.
    pub async fn check(&mut self) -> bool {
        let (program, args) = match self.probe_cmd.split_first() {
            Some(split) => split,
            None => return false,
        };

        let output = match Command::new(program).args(args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Health probe failed to run: {}", e);
                return false;
            }
        };
        if !output.status.success() {
            debug!("Health probe exited with {}", output.status);
            return false;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_duration(&stdout) {
            Some(duration) if duration > self.last_duration => {
                self.last_duration = duration;
                true
            }
            Some(duration) => {
                debug!(
                    "Playback stalled at duration {} (last {})",
                    duration, self.last_duration
                );
                false
            }
            None => {
                debug!("Health probe output had no duration");
                false
            }
        }
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Duration: (\d+)").expect("pattern is valid"))
}

/// Extracts the number following the `Duration:` label, if any.
fn parse_duration(text: &str) -> Option<u64> {
    duration_pattern().captures(text)?.get(1)?.as_str().parse().ok()
}
