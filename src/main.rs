mod catalog;
mod chat;
mod config;
mod error;
mod handlers;
mod models;
mod overlay;
mod shutdown;
mod station;
mod stream;
mod tasks;
mod voting;

use catalog::DirectoryCatalog;
use chat::ListenerManager;
use chat::console::ConsoleSource;
use config::Config;
use log::{error, info, warn};
use overlay::FileOverlay;
use station::BroadcastStation;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use stream::ProcessSupervisor;
use stream::command::ffmpeg_template;
use tokio_util::sync::CancellationToken;

// How long chat listeners get to wind down before being aborted
const LISTENER_STOP_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration ({}): {}", e.as_label(), e);
            process::exit(1);
        }
    };
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let template = match ffmpeg_template(&config) {
        Ok(template) => template,
        Err(e) => {
            error!("Cannot build encoder command ({}): {}", e.as_label(), e);
            process::exit(1);
        }
    };
    info!("Encoder command: {}", template.redacted(Path::new("{input}")));

    let overlay = match FileOverlay::new(config.overlay_file.clone()).await {
        Ok(overlay) => Arc::new(overlay),
        Err(e) => {
            error!("Failed to create overlay file {}: {}", config.overlay_file.display(), e);
            process::exit(1);
        }
    };
    let catalog = Arc::new(DirectoryCatalog::new(config.videos_folder.clone(), &config.ffprobe_bin));
    let publisher = ProcessSupervisor::new(template).with_grace_period(config.watchdog_grace());

    let shutdown = CancellationToken::new();
    let tally = voting::shared_tally();

    // --- Vote ingestion: every listener feeds one channel ---
    let (votes_tx, votes_rx) = handlers::vote_channel();
    let ingest = tokio::spawn(tasks::vote_ingest::run_vote_ingest(
        tally.clone(),
        votes_rx,
        shutdown.clone(),
    ));

    let mut listeners = ListenerManager::new(shutdown.child_token());
    if config.console_votes {
        listeners.add(Arc::new(ConsoleSource));
    }
    if listeners.is_empty() {
        info!("No chat listeners configured");
    }
    listeners.start(votes_tx);

    let mut station = BroadcastStation::new(
        catalog,
        overlay,
        Box::new(publisher),
        tally,
        config.timings(),
        shutdown.clone(),
    );
    let station_task = tokio::spawn(async move { station.run().await });

    info!("Station running, press Ctrl+C to stop");
    if let Err(e) = shutdown::wait_for_shutdown_signal().await {
        error!("Failed to listen for shutdown signals: {}", e);
    }
    info!("Shutdown signal received");
    shutdown.cancel();

    listeners.stop(LISTENER_STOP_GRACE).await;
    if let Err(e) = station_task.await {
        error!("Station task failed: {}", e);
    }
    if let Err(e) = ingest.await {
        error!("Vote ingestion task failed: {}", e);
    }
    info!("Goodbye");
}
