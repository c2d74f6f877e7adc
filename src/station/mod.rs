// The live-cycle controller: select -> play -> vote -> resolve -> teardown.
// The vote phase reports a VoteOutcome instead of failing, so a broken voting
// subsystem only costs the audience their say in the next pick.

use crate::catalog::{ContentCatalog, pick_random, select_random_choices};
use crate::config::StationTimings;
use crate::error::VotingError;
use crate::models::{ContentItem, VoteOption, assign_letters};
use crate::overlay::{DisplaySink, format};
use crate::stream::{Publisher, Termination};
use crate::voting::{self, SharedTally, VoteOutcome, lock_tally};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    Completed {
        played: ContentItem,
        options: Vec<VoteOption>,
        outcome: VoteOutcome,
        next: Option<ContentItem>,
        // Set when the stream died before the cycle was over
        stream_end: Option<Termination>,
    },
    LaunchFailed {
        content: ContentItem,
    },
    EmptyCatalog,
    Cancelled,
}

pub struct BroadcastStation {
    catalog: Arc<dyn ContentCatalog>,
    display: Arc<dyn DisplaySink>,
    publisher: Box<dyn Publisher>,
    tally: SharedTally,
    timings: StationTimings,
    shutdown: CancellationToken,
    // Winner of the previous cycle
    next_content: Option<ContentItem>,
    stream_end: Option<Termination>,
}

impl BroadcastStation {
    pub fn new(
        catalog: Arc<dyn ContentCatalog>,
        display: Arc<dyn DisplaySink>,
        publisher: Box<dyn Publisher>,
        tally: SharedTally,
        timings: StationTimings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            display,
            publisher,
            tally,
            timings,
            shutdown,
            next_content: None,
            stream_end: None,
        }
    }

    #[cfg(test)]
    pub fn next_content(&self) -> Option<&ContentItem> {
        self.next_content.as_ref()
    }

    // Main broadcast loop, runs until the shutdown token fires
    pub async fn run(&mut self) {
        info!("Broadcast station started");
        let mut cycle: u64 = 0;

        while !self.shutdown.is_cancelled() {
            cycle += 1;
            match self.run_cycle().await {
                CycleReport::Completed {
                    played,
                    outcome,
                    next,
                    ..
                } => debug!(
                    "Cycle {} finished: played {}, vote {}, next {}",
                    cycle,
                    played,
                    outcome
                        .winner()
                        .map(|w| w.letter.to_string())
                        .unwrap_or_else(|| "undecided".to_string()),
                    next.map(|n| n.to_string()).unwrap_or_else(|| "random".to_string())
                ),
                CycleReport::LaunchFailed { content } => {
                    debug!("Cycle {} aborted: could not launch {}", cycle, content)
                }
                CycleReport::EmptyCatalog => debug!("Cycle {} skipped: empty catalog", cycle),
                CycleReport::Cancelled => debug!("Cycle {} cancelled", cycle),
            }
        }

        info!("Shutting down broadcast...");
        voting::force_stop(&self.tally);
        self.publisher.stop().await;
        self.display.clear().await;
        info!("Broadcast stopped");
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let items = match self.catalog.list().await {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to list content ({}): {}", e.as_label(), e);
                Vec::new()
            }
        };

        // Select: last cycle's winner if it is still around
        let carried = self.next_content.take().filter(|next| items.contains(next));
        let current = match carried {
            Some(next) => next,
            None => match pick_random(&items) {
                Some(item) => {
                    info!("Randomly selected content");
                    item
                }
                None => {
                    error!("No content found in catalog");
                    pause(&self.shutdown, self.timings.empty_catalog_backoff).await;
                    return CycleReport::EmptyCatalog;
                }
            },
        };

        let duration = match self.catalog.duration(&current).await {
            Some(duration) => duration,
            None => {
                error!("Could not get duration for {}", current);
                self.timings.default_duration
            }
        };
        info!("Playing: {} ({:.0}s)", current, duration.as_secs_f64());

        let options = self.prepare_options(&items, &current);

        self.display.update(&format::now_playing(&current)).await;

        if let Err(e) = self.publisher.start(&current).await {
            error!("Failed to start stream ({}): {}", e.as_label(), e);
            pause(&self.shutdown, self.timings.launch_retry_pause).await;
            return CycleReport::LaunchFailed { content: current };
        }
        self.publisher.set_expected_duration(duration);
        self.stream_end = None;

        let mut elapsed = Duration::ZERO;
        let vote_opens = self.pre_vote_phase(duration, &mut elapsed).await;

        let outcome = if vote_opens && !self.shutdown.is_cancelled() {
            self.vote_phase(&options, duration, &mut elapsed)
                .await
                .unwrap_or_else(|e| VoteOutcome::Faulted(format!("{} ({})", e, e.as_label())))
        } else {
            VoteOutcome::NoVotes
        };

        if self.shutdown.is_cancelled() {
            voting::force_stop(&self.tally);
            self.teardown().await;
            return CycleReport::Cancelled;
        }

        let next = self.resolve(&outcome, &options).await;
        self.next_content = next.clone();

        self.teardown().await;
        pause(&self.shutdown, self.timings.teardown_pause).await;

        CycleReport::Completed {
            played: current,
            options,
            outcome,
            next,
            stream_end: self.stream_end.take(),
        }
    }

    fn prepare_options(&self, items: &[ContentItem], current: &ContentItem) -> Vec<VoteOption> {
        let count = self.timings.vote_options;
        let mut candidates = select_random_choices(items, count, Some(current));
        if candidates.len() < 2 {
            warn!("Not enough content for voting");
            candidates = items.iter().take(count).cloned().collect();
        }
        assign_letters(candidates)
    }

    // Returns false when the stream died or shutdown began before the vote
    async fn pre_vote_phase(&mut self, duration: Duration, elapsed: &mut Duration) -> bool {
        let vote_start = duration.saturating_sub(self.timings.vote_window);

        while *elapsed < vote_start {
            if !self.publisher.is_streaming().await {
                self.note_stream_end("before voting opened");
                return false;
            }
            if !pause(&self.shutdown, self.timings.tick).await {
                return false;
            }
            *elapsed += self.timings.tick;

            let remaining = vote_start.saturating_sub(*elapsed);
            if !remaining.is_zero() && remaining <= self.timings.countdown {
                self.display
                    .update(&format::vote_countdown(whole_seconds(remaining)))
                    .await;
            }
        }

        let streaming = self.publisher.is_streaming().await;
        if !streaming {
            self.note_stream_end("before voting opened");
        }
        streaming
    }

    async fn vote_phase(
        &mut self,
        options: &[VoteOption],
        duration: Duration,
        elapsed: &mut Duration,
    ) -> Result<VoteOutcome, VotingError> {
        let session = {
            let mut tally = lock_tally(&self.tally)?;
            tally.start(options.to_vec());
            tally.session_id()
        };
        info!(
            "Voting started (session {})",
            session.map(|id| id.to_string()).unwrap_or_default()
        );

        // Keep collecting past the end of the content: viewers see it late
        let vote_end = duration + self.timings.vote_grace;
        info!(
            "Voting open for {}s (including {}s grace period)",
            whole_seconds(vote_end.saturating_sub(*elapsed)),
            whole_seconds(self.timings.vote_grace)
        );

        while *elapsed < vote_end {
            let remaining = vote_end - *elapsed;
            let results = {
                let tally = lock_tally(&self.tally)?;
                tally.is_active().then(|| tally.get_results())
            };
            if let Some(results) = results {
                self.display
                    .update(&format::results_with_countdown(
                        &results,
                        options,
                        whole_seconds(remaining),
                    ))
                    .await;
            }

            if !pause(&self.shutdown, self.timings.tick).await {
                break;
            }
            *elapsed += self.timings.tick;

            // The dead man's switch may have killed it
            if !self.publisher.is_streaming().await {
                self.note_stream_end("during voting");
                break;
            }
        }

        let mut tally = lock_tally(&self.tally)?;
        tally.stop();
        Ok(match tally.get_winner() {
            Some(winner) => VoteOutcome::Resolved(winner),
            None => VoteOutcome::NoVotes,
        })
    }

    async fn resolve(&mut self, outcome: &VoteOutcome, options: &[VoteOption]) -> Option<ContentItem> {
        match outcome {
            VoteOutcome::Resolved(winner) => {
                info!("Winner: {}) {}", winner.letter, winner.content);
                self.display.update(&format::winner(winner)).await;
                pause(&self.shutdown, self.timings.winner_display).await;
                Some(winner.content.clone())
            }
            VoteOutcome::NoVotes => {
                info!("No votes received, selecting randomly");
                random_option(options)
            }
            VoteOutcome::Faulted(reason) => {
                error!("Voting system error (safe mode activated): {}", reason);
                voting::force_stop(&self.tally);
                let next = random_option(options);
                info!("Safe mode: selected random content as fallback");
                next
            }
        }
    }

    fn note_stream_end(&mut self, phase: &str) {
        let termination = self.publisher.last_termination();
        match termination {
            Some(termination) => warn!("Stream ended {}: {}", phase, termination),
            None => warn!("Stream ended {}", phase),
        }
        self.stream_end = termination;
    }

    async fn teardown(&mut self) {
        self.publisher.stop().await;
        self.display.clear().await;
    }
}

fn random_option(options: &[VoteOption]) -> Option<ContentItem> {
    let contents: Vec<ContentItem> = options.iter().map(|o| o.content.clone()).collect();
    pick_random(&contents)
}

// Sleeps unless shutdown fires first. Returns false if it was interrupted.
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs_f64().ceil() as u64
}

#[cfg(test)]
mod tests;
