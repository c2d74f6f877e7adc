pub mod plurality;

pub use plurality::VoteTally;

use crate::error::VotingError;
use crate::models::VoteOption;
use log::warn;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

// One tally per station, written by the ingestion task and read/controlled
// by the orchestrator.
pub type SharedTally = Arc<Mutex<VoteTally>>;

pub fn shared_tally() -> SharedTally {
    Arc::new(Mutex::new(VoteTally::new()))
}

pub fn lock_tally(tally: &SharedTally) -> Result<MutexGuard<'_, VoteTally>, VotingError> {
    tally.lock().map_err(|_| VotingError::TallyUnavailable)
}

// Used on the safe-mode path: stop the session even if a writer panicked
// while holding the lock, then make the lock usable again.
pub fn force_stop(tally: &SharedTally) {
    let mut guard = tally.lock().unwrap_or_else(PoisonError::into_inner);
    guard.stop();
    drop(guard);
    if tally.is_poisoned() {
        warn!("Vote tally lock was poisoned; clearing it for the next session");
        tally.clear_poison();
    }
}

// How the vote phase of a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    // Decisive winner, carried over to the next cycle.
    Resolved(VoteOption),
    // Nobody voted, or the window never opened.
    NoVotes,
    // The voting subsystem failed; the reason is only logged.
    Faulted(String),
}

impl VoteOutcome {
    pub fn winner(&self) -> Option<&VoteOption> {
        match self {
            VoteOutcome::Resolved(option) => Some(option),
            _ => None,
        }
    }
}

// Structure to hold vote counts
#[derive(Debug, Clone, Serialize)]
pub struct VoteCount {
    pub letter: char,
    pub title: String,
    pub votes: u32,
}

// Point-in-time view of a session, logged as JSON when voting stops
#[derive(Debug, Clone, Serialize)]
pub struct TallySnapshot {
    pub session_id: Option<Uuid>,
    pub active: bool,
    pub counts: Vec<VoteCount>,
    pub total_voters: usize,
}
