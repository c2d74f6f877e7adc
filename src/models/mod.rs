use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// A playable item from the content catalog. The path is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentItem {
    pub path: PathBuf,
}

impl ContentItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Human readable title derived from the file stem
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for ContentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    pub letter: char,
    pub content: ContentItem,
}

impl VoteOption {
    pub fn new(letter: char, content: ContentItem) -> Self {
        Self {
            letter: letter.to_ascii_uppercase(),
            content,
        }
    }
}

// Letters are handed out in selection order: A, B, C, ...
pub fn assign_letters(candidates: Vec<ContentItem>) -> Vec<VoteOption> {
    candidates
        .into_iter()
        .zip('A'..='Z')
        .map(|(content, letter)| VoteOption::new(letter, content))
        .collect()
}

// Unit of one-vote-per-session enforcement. The same name on two platforms
// is two different voters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoterKey {
    pub platform: String,
    pub username: String,
}

impl VoterKey {
    pub fn new(platform: &str, username: &str) -> Self {
        Self {
            platform: platform.to_lowercase(),
            username: username.to_lowercase(),
        }
    }
}

impl fmt::Display for VoterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter: VoterKey,
    pub choice: char,
    pub timestamp: DateTime<Utc>,
}

// What a chat listener hands over after normalizing a raw chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub platform: String,
    pub username: String,
    pub choice: String,
    pub timestamp: DateTime<Utc>,
}

impl VoteEvent {
    pub fn new(platform: &str, username: &str, choice: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            platform: platform.to_string(),
            username: username.to_string(),
            choice: choice.to_string(),
            timestamp,
        }
    }
}
