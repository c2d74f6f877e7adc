use crate::handlers::{VoteReceiver, handle_vote_event};
use crate::voting::SharedTally;
use log::info;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

const REPORT_INTERVAL_SECONDS: u64 = 300; // Log ingestion volume every 5 minutes

// Drains votes from every listener into the tally. Single consumer, so tally
// mutation never races between platforms.
pub async fn run_vote_ingest(tally: SharedTally, mut votes: VoteReceiver, shutdown: CancellationToken) {
    info!("Starting vote ingestion task...");
    let mut report = interval(Duration::from_secs(REPORT_INTERVAL_SECONDS));
    report.tick().await; // first tick completes immediately
    let mut received: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = report.tick() => {
                if received > 0 {
                    info!("Received {} vote messages in the last {}s", received, REPORT_INTERVAL_SECONDS);
                    received = 0;
                }
            }
            event = votes.recv() => match event {
                Some(event) => {
                    received += 1;
                    handle_vote_event(&tally, event);
                }
                // every sender is gone
                None => break,
            },
        }
    }

    info!("Vote ingestion task stopped");
}
