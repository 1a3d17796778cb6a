mod config;
mod engine;
mod health;
mod state;
mod supervisor;
mod web;

use axum::{routing::get, Router};
use clap::Parser;
use config::WatchConfig;
use state::{AppState, SharedState};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

const STATUS_LISTEN: &str = "0.0.0.0:7070";

const USAGE: &str =
    "USAGE: streamwatch <log file> <player> <stream URL 1> [ <stream URL 2> ... cyclesecs ]";

/// Streamwatch - keeps a video player pointed at network streams on an
/// unattended display, restarting it whenever it crashes or stalls.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log file destination
    log_file: String,
    /// Player kind (omx or vlc)
    player: String,
    /// Stream URLs; two or more must be followed by a cycle interval in seconds
    #[arg(required = true, num_args = 1..)]
    targets: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Log to stdout and to the file named on the command line.
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)?;
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .init();

    let config = match WatchConfig::from_args(&args.player, &args.targets) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };
    info!(
        "Streamwatch initialized. Player: {}, {} stream(s), {:?} mode.",
        config.player,
        config.streams.len(),
        config.mode
    );

    let state = Arc::new(AppState::new(config.clone()));

    // Read-only status server.
    let app = Router::new()
        .route("/status", get(web::admin::get_status))
        .route("/sys/status", get(web::admin::sys_status))
        .route("/reboot", get(web::admin::do_reboot))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind(STATUS_LISTEN).await?;
    info!("Status server listening on {}", STATUS_LISTEN);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Status server failed: {}", e);
        }
    });

    // Stream cycle timer, cycle mode only.
    let cycle_flag = config.cycle_secs.map(|secs| {
        let flag = Arc::new(AtomicBool::new(false));
        info!("Starting stream cycler with a {}s interval...", secs);
        tokio::spawn(supervisor::run_cycler(
            flag.clone(),
            Duration::from_secs(secs),
        ));
        flag
    });

    // Supervise until the shutdown signal, then make sure no player
    // process is left behind.
    tokio::select! {
        _ = supervisor::run(state.clone(), cycle_flag, supervisor::Timings::default()) => {}
        _ = shutdown_on(&state, shutdown_signal()) => {}
    }

    Ok(())
}

/// Waits for the shutdown signal, then force-closes any live player so
/// the device is not left with an orphaned process. Safe when no
/// player is running, and bounded: the forced kill does not wait on
/// player cooperation.
async fn shutdown_on<F>(state: &SharedState, signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Signal handling failed: {}", e);
    }
    info!("Shutdown signal received, force-closing the player...");
    engine::terminate(state, true).await;
    info!("Gracefully stopped. Bye.");
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Mode;

    fn test_state() -> SharedState {
        Arc::new(AppState::new(WatchConfig {
            player: "omx".to_string(),
            command_template: "{url}".to_string(),
            streams: vec!["rtsp://cam/1".to_string()],
            mode: Mode::Single,
            cycle_secs: None,
            probe_cmd: vec!["true".to_string()],
        }))
    }

    #[tokio::test]
    async fn shutdown_force_stops_the_player_within_a_bounded_path() {
        let state = test_state();
        let _output = engine::launch(&state, "sleep 30").unwrap();
        assert!(state.player.lock().unwrap().is_some());

        let bounded = tokio::time::timeout(
            Duration::from_secs(5),
            shutdown_on(&state, async { Ok::<(), std::io::Error>(()) }),
        )
        .await;

        assert!(bounded.is_ok());
        assert!(state.player.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_without_a_player_is_a_clean_no_op() {
        let state = test_state();
        let bounded = tokio::time::timeout(
            Duration::from_secs(5),
            shutdown_on(&state, async { Ok::<(), std::io::Error>(()) }),
        )
        .await;

        assert!(bounded.is_ok());
        assert!(state.player.lock().unwrap().is_none());
    }
}
