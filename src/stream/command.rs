use crate::config::{Config, Destination};
use crate::error::StreamError;
use std::path::Path;
use tokio::process::Command;

const INPUT_PLACEHOLDER: &str = "{input}";

// Program plus argument list for the publish process.
//
// Any argument containing `{input}` gets the content path substituted in.
// `secrets` are masked whenever the command line is logged.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub secrets: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            secrets: Vec::new(),
        }
    }

    pub fn with_secrets(mut self, secrets: Vec<String>) -> Self {
        self.secrets = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        self
    }

    pub fn render_args(&self, input: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(INPUT_PLACEHOLDER, &input))
            .collect()
    }

    pub fn to_command(&self, input: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(input));
        cmd
    }

    // Command line safe for logs: stream keys replaced
    pub fn redacted(&self, input: &Path) -> String {
        let mut line = std::iter::once(self.program.clone())
            .chain(self.render_args(input))
            .collect::<Vec<_>>()
            .join(" ");
        for secret in &self.secrets {
            line = line.replace(secret.as_str(), "***REDACTED***");
        }
        line
    }
}

// Single encode, fanned out to every destination through ffmpeg's tee muxer.
pub fn ffmpeg_template(config: &Config) -> Result<CommandTemplate, StreamError> {
    let destinations = config.active_destinations();
    if destinations.is_empty() {
        return Err(StreamError::NoDestinations);
    }

    // Keyframe every two seconds
    let keyframe_interval = config.stream_fps.saturating_mul(2).to_string();
    let args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-nostats".to_string(),
        // Read input at native frame rate
        "-re".to_string(),
        "-i".to_string(),
        INPUT_PLACEHOLDER.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-b:v".to_string(),
        config.stream_bitrate.clone(),
        "-maxrate".to_string(),
        config.stream_bitrate.clone(),
        "-bufsize".to_string(),
        "6000k".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-g".to_string(),
        keyframe_interval,
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-f".to_string(),
        "tee".to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "0:a".to_string(),
        tee_outputs(&destinations),
    ];

    let secrets = destinations.into_iter().map(|d| d.stream_key).collect();
    Ok(CommandTemplate::new(&config.ffmpeg_bin, args).with_secrets(secrets))
}

fn tee_outputs(destinations: &[Destination]) -> String {
    destinations
        .iter()
        .map(|d| format!("[f=flv]{}", d.url))
        .collect::<Vec<_>>()
        .join("|")
}
