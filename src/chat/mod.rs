// Vote sources and their lifecycle.
//
// Each platform listener runs in its own task with its own reconnect loop and
// only ever talks to the station through the vote channel. Platform protocol
// handling lives behind `VoteSource`; this module only keeps the loops alive
// and tears them down in bounded time.

pub mod console;

use crate::error::ListenerError;
use crate::handlers::VoteSender;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
pub trait VoteSource: Send + Sync {
    fn name(&self) -> &str;

    // Runs one connection until it drops or `shutdown` fires.
    async fn run(&self, votes: VoteSender, shutdown: CancellationToken) -> Result<(), ListenerError>;
}

pub struct ListenerManager {
    sources: Vec<Arc<dyn VoteSource>>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    reconnect_delay: Duration,
}

impl ListenerManager {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            sources: Vec::new(),
            tasks: Vec::new(),
            shutdown,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn add(&mut self, source: Arc<dyn VoteSource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn start(&mut self, votes: VoteSender) {
        for source in &self.sources {
            info!("{} listener starting...", source.name());
            self.tasks.push(tokio::spawn(run_with_reconnect(
                Arc::clone(source),
                votes.clone(),
                self.shutdown.clone(),
                self.reconnect_delay,
            )));
        }
    }

    // Cancels every listener; anything still running after `grace` is aborted
    pub async fn stop(&mut self, grace: Duration) {
        self.shutdown.cancel();
        for mut task in self.tasks.drain(..) {
            if timeout(grace, &mut task).await.is_err() {
                warn!("Listener did not stop within {:?}, aborting", grace);
                task.abort();
            }
        }
        info!("All chat listeners stopped");
    }
}

async fn run_with_reconnect(
    source: Arc<dyn VoteSource>,
    votes: VoteSender,
    shutdown: CancellationToken,
    delay: Duration,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match source.run(votes.clone(), shutdown.clone()).await {
            Ok(()) if shutdown.is_cancelled() => break,
            Ok(()) => warn!("{} connection closed, reconnecting in {:?}", source.name(), delay),
            Err(e) => warn!(
                "{} listener failed ({}): {}, reconnecting in {:?}",
                source.name(),
                e.as_label(),
                e,
                delay
            ),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }
    info!("{} listener stopped", source.name());
}
