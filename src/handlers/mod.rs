pub mod vote;

use crate::models::VoteEvent;
use crate::voting::{SharedTally, lock_tally};
use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub const VOTE_CHANNEL_CAPACITY: usize = 1024;

pub type VoteSender = mpsc::Sender<VoteEvent>;
pub type VoteReceiver = mpsc::Receiver<VoteEvent>;

pub fn vote_channel() -> (VoteSender, VoteReceiver) {
    mpsc::channel(VOTE_CHANNEL_CAPACITY)
}

// Called from listener loops. Never waits: a full channel drops the vote.
pub fn submit_vote(sender: &VoteSender, event: VoteEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(
                "Vote channel full, dropping vote from {} ({})",
                event.username, event.platform
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Vote channel closed, station is shutting down");
            false
        }
    }
}

// Ingestion point: applies one event to the shared tally
pub fn handle_vote_event(tally: &SharedTally, event: VoteEvent) {
    match lock_tally(tally) {
        Ok(mut tally) => {
            tally.record_vote(&event.platform, &event.username, &event.choice, event.timestamp)
        }
        Err(e) => error!("Failed to record vote from {}: {}", event.username, e),
    }
}
