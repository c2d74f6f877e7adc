// Error types for the broadcast station.
//
// Only startup can fail hard. Everything raised while the station is running
// is handled at the cycle boundary and logged with its `as_label` tag.

use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidValue { .. } => "config_invalid_value",
        }
    }
}

// Failures of the outbound publish process.
#[derive(Error, Debug)]
pub enum StreamError {
    // No stream key configured, nothing to publish to.
    #[error("no stream destinations configured")]
    NoDestinations,

    // The encoder binary could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // The encoder died inside the launch window.
    #[error("encoder exited immediately ({status}): {stderr}")]
    ExitedEarly { status: ExitStatus, stderr: String },
}

impl StreamError {
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::NoDestinations => "stream_no_destinations",
            StreamError::Spawn { .. } => "stream_spawn_failed",
            StreamError::ExitedEarly { .. } => "stream_exited_early",
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read content folder {folder}: {source}")]
    Io {
        folder: String,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CatalogError::Io { .. } => "catalog_io",
        }
    }
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("listener io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListenerError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Io(_) => "listener_io",
        }
    }
}

#[derive(Error, Debug)]
pub enum VotingError {
    // The tally lock was poisoned by a panicking writer.
    #[error("vote tally unavailable")]
    TallyUnavailable,
}

impl VotingError {
    pub fn as_label(&self) -> &'static str {
        match self {
            VotingError::TallyUnavailable => "voting_tally_unavailable",
        }
    }
}
