use crate::models::{Vote, VoteOption, VoterKey};
use crate::voting::{TallySnapshot, VoteCount};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

// Per-option running count plus the moment each count was first reached
#[derive(Debug)]
struct OptionTally {
    option: VoteOption,
    count: u32,
    reached_at: HashMap<u32, DateTime<Utc>>,
}

impl OptionTally {
    fn new(option: VoteOption) -> Self {
        Self {
            option,
            count: 0,
            reached_at: HashMap::new(),
        }
    }

    fn increment(&mut self, timestamp: DateTime<Utc>) {
        self.count += 1;
        // Only the FIRST time a count is reached matters for tie-breaking
        self.reached_at.entry(self.count).or_insert(timestamp);
    }

    fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
    }
}

// Plurality vote ledger for one voting session at a time.
//
// One live vote per `VoterKey`; a voter may switch, never stack. Ties on the
// top count go to the option that reached that count first.
#[derive(Debug, Default)]
pub struct VoteTally {
    session_id: Option<Uuid>,
    options: BTreeMap<char, OptionTally>,
    votes: HashMap<VoterKey, Vote>,
    is_active: bool,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, options: Vec<VoteOption>) {
        self.options.clear();
        self.votes.clear();

        for option in options {
            let letter = option.letter.to_ascii_uppercase();
            self.options.insert(letter, OptionTally::new(VoteOption { letter, ..option }));
        }

        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.is_active = true;
        info!(
            "Voting session {} started with {} options",
            session_id,
            self.options.len()
        );
    }

    pub fn stop(&mut self) {
        self.is_active = false;
        info!(
            "Voting stopped. Final tally: {}. Total voters: {}",
            self.tally_line(),
            self.total_voters()
        );
        debug!(
            "Final snapshot: {}",
            serde_json::to_string(&self.snapshot()).unwrap_or_default()
        );
    }

    pub fn record_vote(
        &mut self,
        platform: &str,
        username: &str,
        choice: &str,
        timestamp: DateTime<Utc>,
    ) {
        if !self.is_active {
            return;
        }

        let Some(letter) = parse_choice(choice) else {
            debug!("Invalid vote choice from {}: {:?}", username, choice);
            return;
        };
        if !self.options.contains_key(&letter) {
            debug!("Vote for unknown option {} from {}", letter, username);
            return;
        }

        let voter = VoterKey::new(platform, username);

        match self.votes.get(&voter).map(|vote| vote.choice) {
            Some(previous) if previous == letter => {
                // Same vote again, ignore to prevent spam
                debug!("Duplicate vote ignored: {} already voted {}", voter, letter);
                return;
            }
            Some(previous) => {
                if let Some(old) = self.options.get_mut(&previous) {
                    old.decrement();
                }
                info!("[Vote] {} ({}) changed vote: {} -> {}", username, platform, previous, letter);
            }
            None => {
                info!("[Vote] {} ({}) voted: {}", username, platform, letter);
            }
        }

        if let Some(option) = self.options.get_mut(&letter) {
            option.increment(timestamp);
        }
        self.votes.insert(
            voter.clone(),
            Vote {
                voter,
                choice: letter,
                timestamp,
            },
        );

        info!("[Tally] {}", self.tally_line());
    }

    pub fn get_results(&self) -> BTreeMap<char, u32> {
        self.options
            .iter()
            .map(|(letter, option)| (*letter, option.count))
            .collect()
    }

    pub fn get_winner(&self) -> Option<VoteOption> {
        let max_votes = self.options.values().map(|o| o.count).max()?;
        if max_votes == 0 {
            return None;
        }

        let tied: Vec<&OptionTally> = self
            .options
            .values()
            .filter(|o| o.count == max_votes)
            .collect();

        // First to reach the winning count wins; exact timestamp ties fall
        // back to letter order.
        let winner = tied.iter().min_by_key(|o| {
            o.reached_at
                .get(&max_votes)
                .copied()
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })?;

        if tied.len() > 1 {
            let letters: Vec<char> = tied.iter().map(|o| o.option.letter).collect();
            info!(
                "Tie between {:?} at {} votes. Winner: {} (reached {} first)",
                letters, max_votes, winner.option.letter, max_votes
            );
        }

        Some(winner.option.clone())
    }

    pub fn total_voters(&self) -> usize {
        self.votes.len()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    #[cfg(test)]
    pub fn options(&self) -> Vec<VoteOption> {
        self.options.values().map(|o| o.option.clone()).collect()
    }

    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            session_id: self.session_id,
            active: self.is_active,
            counts: self
                .options
                .values()
                .map(|o| VoteCount {
                    letter: o.option.letter,
                    title: o.option.content.title(),
                    votes: o.count,
                })
                .collect(),
            total_voters: self.total_voters(),
        }
    }

    fn tally_line(&self) -> String {
        self.options
            .iter()
            .map(|(letter, option)| format!("{}:{}", letter, option.count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// Exactly one character after trimming, upper-cased
fn parse_choice(choice: &str) -> Option<char> {
    let mut chars = choice.trim().chars();
    let letter = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(letter.to_ascii_uppercase())
}
