use super::*;
use crate::error::{CatalogError, StreamError};
use crate::handlers::{submit_vote, vote_channel};
use crate::models::VoteEvent;
use crate::tasks::vote_ingest::run_vote_ingest;
use crate::voting::shared_tally;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Instant, timeout};

#[derive(Default)]
struct PublisherState {
    fail_launch: bool,
    // Stream dies after this many liveness polls
    polls_before_death: Option<usize>,
    polls: usize,
    streaming: bool,
    started: Vec<ContentItem>,
    stops: usize,
    expected: Option<Duration>,
    termination: Option<Termination>,
}

#[derive(Clone, Default)]
struct FakePublisher {
    state: Arc<Mutex<PublisherState>>,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn start(&mut self, content: &ContentItem) -> Result<(), StreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_launch {
            return Err(StreamError::NoDestinations);
        }
        state.started.push(content.clone());
        state.streaming = true;
        state.polls = 0;
        Ok(())
    }

    fn set_expected_duration(&mut self, duration: Duration) {
        self.state.lock().unwrap().expected = Some(duration);
    }

    async fn is_streaming(&mut self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.streaming {
            return false;
        }
        state.polls += 1;
        if let Some(limit) = state.polls_before_death {
            if state.polls > limit {
                state.streaming = false;
                state.termination = Some(Termination::WatchdogKilled);
            }
        }
        state.streaming
    }

    async fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.streaming = false;
        state.stops += 1;
        state.termination = Some(Termination::Stopped);
    }

    fn last_termination(&self) -> Option<Termination> {
        self.state.lock().unwrap().termination
    }
}

struct MemoryCatalog {
    items: Mutex<Vec<ContentItem>>,
    duration: Option<Duration>,
}

#[async_trait]
impl ContentCatalog for MemoryCatalog {
    async fn list(&self) -> Result<Vec<ContentItem>, CatalogError> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn duration(&self, _item: &ContentItem) -> Option<Duration> {
        self.duration
    }
}

#[derive(Default)]
struct RecordingDisplay {
    shown: Mutex<Vec<String>>,
    clears: AtomicUsize,
}

impl RecordingDisplay {
    fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl DisplaySink for RecordingDisplay {
    async fn update(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }

    async fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    station: BroadcastStation,
    publisher: Arc<Mutex<PublisherState>>,
    catalog: Arc<MemoryCatalog>,
    display: Arc<RecordingDisplay>,
    tally: SharedTally,
    shutdown: CancellationToken,
}

fn library(count: usize) -> Vec<ContentItem> {
    (0..count)
        .map(|i| ContentItem::new(format!("/videos/clip_{}.mp4", i)))
        .collect()
}

fn harness(items: Vec<ContentItem>, duration: Option<Duration>) -> Harness {
    let publisher = FakePublisher::default();
    let state = publisher.state.clone();
    let catalog = Arc::new(MemoryCatalog {
        items: Mutex::new(items),
        duration,
    });
    let display = Arc::new(RecordingDisplay::default());
    let tally = shared_tally();
    let shutdown = CancellationToken::new();

    let station = BroadcastStation::new(
        catalog.clone(),
        display.clone(),
        Box::new(publisher),
        tally.clone(),
        StationTimings::default(),
        shutdown.clone(),
    );

    Harness {
        station,
        publisher: state,
        catalog,
        display,
        tally,
        shutdown,
    }
}

fn option_contents(options: &[VoteOption]) -> Vec<ContentItem> {
    options.iter().map(|o| o.content.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn cycle_without_votes_picks_a_random_option() {
    let mut h = harness(library(6), Some(Duration::from_secs(70)));

    let CycleReport::Completed {
        played,
        options,
        outcome,
        next,
        stream_end,
    } = h.station.run_cycle().await
    else {
        panic!("cycle should complete");
    };

    assert_eq!(outcome, VoteOutcome::NoVotes);
    assert_eq!(stream_end, None);
    let letters: Vec<char> = options.iter().map(|o| o.letter).collect();
    assert_eq!(letters, vec!['A', 'B', 'C', 'D']);
    assert!(!option_contents(&options).contains(&played));

    let next = next.expect("random fallback");
    assert!(option_contents(&options).contains(&next));
    assert_eq!(h.station.next_content(), Some(&next));

    {
        let publisher = h.publisher.lock().unwrap();
        assert_eq!(publisher.started, vec![played.clone()]);
        assert_eq!(publisher.expected, Some(Duration::from_secs(70)));
        assert!(!publisher.streaming);
        assert!(publisher.stops >= 1);
    }

    let tally = lock_tally(&h.tally).unwrap();
    assert!(tally.session_id().is_some());
    assert!(!tally.is_active());
    drop(tally);

    let shown = h.display.shown();
    assert_eq!(shown[0], format::now_playing(&played));
    assert!(shown.iter().any(|text| text.contains("NEXT VIDEO VOTE")));
    assert!(h.display.clears.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn countdown_is_shown_in_the_last_seconds_before_the_vote() {
    // vote opens 20s in
    let mut h = harness(library(5), Some(Duration::from_secs(80)));
    h.station.run_cycle().await;

    let shown = h.display.shown();
    assert!(shown.contains(&"Voting starts in 10 seconds...".to_string()));
    assert!(shown.contains(&"Voting starts in 1 seconds...".to_string()));
    assert!(!shown.contains(&"Voting starts in 11 seconds...".to_string()));
    assert!(!shown.contains(&"Voting starts in 0 seconds...".to_string()));
}

#[tokio::test(start_paused = true)]
async fn audience_vote_decides_the_next_cycle() {
    let mut h = harness(library(6), Some(Duration::from_secs(70)));

    let (tx, rx) = vote_channel();
    let ingest = tokio::spawn(run_vote_ingest(h.tally.clone(), rx, h.shutdown.clone()));
    let voter = tokio::spawn({
        let tally = h.tally.clone();
        async move {
            loop {
                sleep(Duration::from_millis(500)).await;
                let active = lock_tally(&tally).unwrap().is_active();
                if active {
                    break;
                }
            }
            submit_vote(&tx, VoteEvent::new("twitch", "u1", "B", Utc::now()));
            submit_vote(&tx, VoteEvent::new("kick", "u2", "b", Utc::now()));
            submit_vote(&tx, VoteEvent::new("twitch", "u3", "A", Utc::now()));
        }
    });

    let CycleReport::Completed {
        options,
        outcome,
        next,
        ..
    } = h.station.run_cycle().await
    else {
        panic!("cycle should complete");
    };
    voter.await.unwrap();

    let winner = outcome.winner().expect("decisive vote").clone();
    assert_eq!(winner, options[1]);
    assert_eq!(next.as_ref(), Some(&winner.content));
    assert!(h.display.shown().contains(&format::winner(&winner)));

    // Winner plays next
    let CycleReport::Completed { played, .. } = h.station.run_cycle().await else {
        panic!("second cycle should complete");
    };
    assert_eq!(played, winner.content);
    assert_eq!(h.publisher.lock().unwrap().started[1], winner.content);

    h.shutdown.cancel();
    ingest.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn broken_tally_switches_to_safe_mode() {
    let mut h = harness(library(6), Some(Duration::from_secs(70)));

    let poisoned = h.tally.clone();
    let _ = std::thread::spawn(move || {
        let _guard = poisoned.lock().unwrap();
        panic!("writer died holding the tally");
    })
    .join();
    assert!(h.tally.is_poisoned());

    let CycleReport::Completed {
        options,
        outcome,
        next,
        ..
    } = h.station.run_cycle().await
    else {
        panic!("the broadcast must survive a voting failure");
    };

    assert!(matches!(outcome, VoteOutcome::Faulted(_)));
    assert!(option_contents(&options).contains(&next.expect("random fallback")));

    // Recovered for the next session
    assert!(!h.tally.is_poisoned());
    assert!(!lock_tally(&h.tally).unwrap().is_active());
    assert!(h.publisher.lock().unwrap().stops >= 1);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_skips_the_vote() {
    let mut h = harness(library(4), Some(Duration::from_secs(70)));
    h.publisher.lock().unwrap().fail_launch = true;

    let started = Instant::now();
    let report = h.station.run_cycle().await;

    let content = match report {
        CycleReport::LaunchFailed { content } => content,
        other => panic!("expected a launch failure, got {:?}", other),
    };
    assert!(library(4).contains(&content));
    assert!(started.elapsed() >= StationTimings::default().launch_retry_pause);
    assert!(lock_tally(&h.tally).unwrap().session_id().is_none());
    assert!(h.station.next_content().is_none());
}

#[tokio::test(start_paused = true)]
async fn stream_dying_before_the_vote_skips_it() {
    // No known duration, so the 300s default applies
    let mut h = harness(library(5), None);
    h.publisher.lock().unwrap().polls_before_death = Some(3);

    let started = Instant::now();
    let CycleReport::Completed {
        options,
        outcome,
        next,
        stream_end,
        ..
    } = h.station.run_cycle().await
    else {
        panic!("cycle should complete");
    };

    assert_eq!(stream_end, Some(Termination::WatchdogKilled));
    assert_eq!(
        h.publisher.lock().unwrap().expected,
        Some(Duration::from_secs(300))
    );
    assert_eq!(outcome, VoteOutcome::NoVotes);
    assert!(lock_tally(&h.tally).unwrap().session_id().is_none());
    assert!(option_contents(&options).contains(&next.unwrap()));
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn stream_dying_mid_vote_closes_the_window() {
    // 10 ticks before the vote opens, then a few during it
    let mut h = harness(library(5), Some(Duration::from_secs(70)));
    h.publisher.lock().unwrap().polls_before_death = Some(15);

    let started = Instant::now();
    let CycleReport::Completed {
        outcome, stream_end, ..
    } = h.station.run_cycle().await
    else {
        panic!("cycle should complete");
    };

    assert_eq!(outcome, VoteOutcome::NoVotes);
    assert_eq!(stream_end, Some(Termination::WatchdogKilled));
    let tally = lock_tally(&h.tally).unwrap();
    assert!(tally.session_id().is_some());
    assert!(!tally.is_active());
    drop(tally);
    assert!(started.elapsed() < Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn empty_catalog_backs_off() {
    let mut h = harness(Vec::new(), Some(Duration::from_secs(70)));

    let started = Instant::now();
    assert_eq!(h.station.run_cycle().await, CycleReport::EmptyCatalog);
    assert!(started.elapsed() >= StationTimings::default().empty_catalog_backoff);
    assert!(h.publisher.lock().unwrap().started.is_empty());
}

#[tokio::test(start_paused = true)]
async fn removed_winner_is_replaced_by_a_random_pick() {
    let mut h = harness(library(6), Some(Duration::from_secs(70)));

    let CycleReport::Completed { next, .. } = h.station.run_cycle().await else {
        panic!("cycle should complete");
    };
    let removed = next.unwrap();
    h.catalog.items.lock().unwrap().retain(|item| item != &removed);

    let CycleReport::Completed { played, .. } = h.station.run_cycle().await else {
        panic!("cycle should complete");
    };
    assert_ne!(played, removed);
    assert!(h.catalog.items.lock().unwrap().contains(&played));
}

#[tokio::test(start_paused = true)]
async fn single_item_catalog_still_cycles() {
    let mut h = harness(library(1), Some(Duration::from_secs(30)));

    let CycleReport::Completed {
        played,
        options,
        next,
        ..
    } = h.station.run_cycle().await
    else {
        panic!("cycle should complete");
    };

    assert_eq!(option_contents(&options), vec![played.clone()]);
    assert_eq!(next, Some(played));
}

#[tokio::test(start_paused = true)]
async fn run_stops_the_stream_on_shutdown() {
    let h = harness(library(6), Some(Duration::from_secs(120)));
    let Harness {
        mut station,
        publisher,
        display,
        tally,
        shutdown,
        ..
    } = h;

    let handle = tokio::spawn(async move {
        station.run().await;
        station
    });

    sleep(Duration::from_secs(90)).await;
    assert!(publisher.lock().unwrap().streaming);
    assert!(lock_tally(&tally).unwrap().is_active());

    shutdown.cancel();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("station stops promptly")
        .unwrap();

    let publisher = publisher.lock().unwrap();
    assert!(!publisher.streaming);
    assert_eq!(publisher.started.len(), 1);
    assert!(display.clears.load(Ordering::SeqCst) >= 1);
    assert!(!lock_tally(&tally).unwrap().is_active());
}
