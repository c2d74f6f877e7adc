use crate::chat::VoteSource;
use crate::error::ListenerError;
use crate::handlers::vote::parse_vote_message;
use crate::handlers::{VoteSender, submit_vote};
use crate::models::VoteEvent;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::io::{self, BufRead};
use std::thread;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_PLATFORM: &str = "console";
const LINE_BUFFER: usize = 64;

// Votes typed on stdin, one per line: `[platform] username choice`.
// For running the station locally without any chat platform.
pub struct ConsoleSource;

#[async_trait]
impl VoteSource for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    async fn run(&self, votes: VoteSender, shutdown: CancellationToken) -> Result<(), ListenerError> {
        info!("Console votes enabled: type `[platform] username letter`");
        // tokio's stdin would keep the runtime alive until the next line arrives
        let lines = spawn_line_reader(io::stdin())?;
        read_votes(lines, &votes, &shutdown).await?;
        // stdin is gone for good, so no point reconnecting
        shutdown.cancelled().await;
        Ok(())
    }
}

// Reads lines on their own OS thread. The thread ends at EOF, on a read
// error (forwarded), or once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: io::Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    thread::Builder::new()
        .name("console-votes".to_string())
        .spawn(move || {
            for line in io::BufReader::new(reader).lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

pub async fn read_votes(
    mut lines: mpsc::Receiver<io::Result<String>>,
    votes: &VoteSender,
    shutdown: &CancellationToken,
) -> Result<(), ListenerError> {
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line.transpose()? else {
            debug!("Console input closed");
            return Ok(());
        };
        if let Some(event) = parse_console_line(&line) {
            submit_vote(votes, event);
        }
    }
}

pub fn parse_console_line(line: &str) -> Option<VoteEvent> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (platform, username, choice) = match parts.as_slice() {
        [username, choice] => (DEFAULT_PLATFORM, *username, *choice),
        [platform, username, choice] => (*platform, *username, *choice),
        _ => {
            debug!("Ignoring console line: {:?}", line);
            return None;
        }
    };
    let letter = parse_vote_message(choice)?;
    Some(VoteEvent::new(platform, username, &letter.to_string(), Utc::now()))
}
