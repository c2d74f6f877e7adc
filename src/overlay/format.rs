use crate::models::{ContentItem, VoteOption};
use std::collections::BTreeMap;

const RESULT_TITLE_WIDTH: usize = 18;

pub fn now_playing(content: &ContentItem) -> String {
    format!("Now Playing: {}", content.title())
}

pub fn vote_countdown(seconds: u64) -> String {
    format!("Voting starts in {} seconds...", seconds)
}

// Live tallies plus the time left before the vote closes
pub fn results_with_countdown(
    results: &BTreeMap<char, u32>,
    options: &[VoteOption],
    seconds_remaining: u64,
) -> String {
    let mut lines = vec![
        "      NEXT VIDEO VOTE".to_string(),
        format!("    Time Remaining: {}s", seconds_remaining),
        "-".repeat(30),
    ];

    for option in options {
        let title = truncate(&option.content.title(), RESULT_TITLE_WIDTH);
        let count = results.get(&option.letter).copied().unwrap_or(0);
        let votes = if count == 1 {
            "1 vote".to_string()
        } else {
            format!("{} votes", count)
        };
        lines.push(format!(
            "{}: {:<width$} {:>8}",
            option.letter,
            title,
            votes,
            width = RESULT_TITLE_WIDTH
        ));
    }

    lines.join("\n")
}

pub fn winner(option: &VoteOption) -> String {
    format!("WINNER: {}) {}\nUp Next!", option.letter, option.content.title())
}

// Cut on char boundaries, marking the cut with "..."
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

// ffmpeg drawtext treats quotes and colons specially
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\'', "'\\''").replace(':', "\\:")
}
