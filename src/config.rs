use anyhow::bail;
use serde::Serialize;

/// Known player kinds and their launch command templates.
///
/// The `{url}` placeholder is replaced with the target stream URL at
/// launch time. The omx template is tuned for low-latency RTSP over
/// HDMI on the kiosk hardware; vlc is the generic fallback.
pub const PLAYER_CMDS: &[(&str, &str)] = &[
    (
        "omx",
        "omxplayer -b -o hdmi --avdict rtsp_transport:tcp --live --threshold 0.2 {url}",
    ),
    ("vlc", "vlc {url}"),
];

/// Progress probe: side-channel status query against the running player.
pub const PROBE_CMD: &[&str] = &["./dbus-omx.sh", "status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Single,
    Cycle,
}

/// Resolved runtime configuration. Immutable once the program starts.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Player kind token as given on the command line (for log messages).
    pub player: String,
    /// Launch command template with a single `{url}` substitution point.
    pub command_template: String,
    /// Ordered rotation list; exactly one entry in single mode.
    pub streams: Vec<String>,
    pub mode: Mode,
    /// Rotation interval; only present in cycle mode.
    pub cycle_secs: Option<u64>,
    /// Progress probe command (program + args).
    pub probe_cmd: Vec<String>,
}

impl WatchConfig {
    /// Builds the configuration from the positional CLI arguments
    /// (everything after the log destination).
    ///
    /// Exactly one URL selects single mode. Two or more URLs followed
    /// by an integer select cycle mode with that rotation interval.
    /// Unknown player kinds and malformed argument lists are fatal
    /// usage errors, never retried.
    pub fn from_args(player: &str, targets: &[String]) -> anyhow::Result<Self> {
        let template = match PLAYER_CMDS.iter().find(|(kind, _)| *kind == player) {
            Some((_, template)) => (*template).to_string(),
            None => bail!(
                "unknown player '{}', expected one of: {}",
                player,
                PLAYER_CMDS
                    .iter()
                    .map(|(kind, _)| *kind)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        if targets.is_empty() {
            bail!("at least one stream URL is required");
        }

        if targets.len() == 1 {
            return Ok(Self {
                player: player.to_string(),
                command_template: template,
                streams: targets.to_vec(),
                mode: Mode::Single,
                cycle_secs: None,
                probe_cmd: PROBE_CMD.iter().map(|s| s.to_string()).collect(),
            });
        }

        // Multiple targets: the trailing argument is the cycle interval.
        let (last, streams) = targets.split_last().expect("targets checked non-empty");
        let cycle_secs: u64 = match last.parse() {
            Ok(secs) => secs,
            Err(_) => bail!(
                "cycle mode needs a trailing interval in seconds, got '{}'",
                last
            ),
        };
        if streams.len() < 2 {
            bail!("cycle mode needs at least two stream URLs");
        }

        Ok(Self {
            player: player.to_string(),
            command_template: template,
            streams: streams.to_vec(),
            mode: Mode::Cycle,
            cycle_secs: Some(cycle_secs),
            probe_cmd: PROBE_CMD.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Renders the launch command for the given stream URL.
    pub fn player_command(&self, url: &str) -> String {
        self.command_template.replace("{url}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_url_selects_single_mode() {
        let cfg = WatchConfig::from_args("omx", &args(&["rtsp://cam/1"])).unwrap();
        assert_eq!(cfg.mode, Mode::Single);
        assert_eq!(cfg.streams, vec!["rtsp://cam/1"]);
        assert_eq!(cfg.cycle_secs, None);
    }

    #[test]
    fn multiple_urls_with_interval_select_cycle_mode() {
        let cfg =
            WatchConfig::from_args("omx", &args(&["rtsp://cam/1", "rtsp://cam/2", "30"])).unwrap();
        assert_eq!(cfg.mode, Mode::Cycle);
        assert_eq!(cfg.streams, vec!["rtsp://cam/1", "rtsp://cam/2"]);
        assert_eq!(cfg.cycle_secs, Some(30));
    }

    #[test]
    fn non_integer_trailing_argument_is_a_usage_error() {
        let err = WatchConfig::from_args("omx", &args(&["rtsp://cam/1", "rtsp://cam/2"]));
        assert!(err.is_err());
    }

    #[test]
    fn unknown_player_is_a_usage_error() {
        let err = WatchConfig::from_args("mplayer", &args(&["rtsp://cam/1"]));
        assert!(err.is_err());
    }

    #[test]
    fn command_template_substitutes_the_url() {
        let cfg = WatchConfig::from_args("vlc", &args(&["rtsp://cam/1"])).unwrap();
        assert_eq!(cfg.player_command("rtsp://cam/1"), "vlc rtsp://cam/1");
    }

    #[test]
    fn omx_template_keeps_transport_flags_around_the_url() {
        let cfg = WatchConfig::from_args("omx", &args(&["rtsp://cam/1"])).unwrap();
        let cmd = cfg.player_command("rtsp://cam/1");
        assert!(cmd.starts_with("omxplayer"));
        assert!(cmd.ends_with("rtsp://cam/1"));
        assert!(!cmd.contains("{url}"));
    }
}
