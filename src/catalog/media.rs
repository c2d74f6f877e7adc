use log::{debug, warn};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const DURATION_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct MediaInfo {
    #[serde(default)]
    format: Option<MediaFormat>,
}

#[derive(Debug, Deserialize)]
struct MediaFormat {
    // ffprobe reports the duration as a decimal string
    #[serde(default)]
    duration: Option<String>,
}

// Media duration via ffprobe, or `None` if it cannot be determined.
pub async fn media_duration(ffprobe_bin: &str, path: &Path) -> Option<Duration> {
    let mut cmd = Command::new(ffprobe_bin);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout(DURATION_QUERY_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Failed to run {} on {}: {}", ffprobe_bin, path.display(), e);
            return None;
        }
        Err(_) => {
            warn!("{} timed out on {}", ffprobe_bin, path.display());
            return None;
        }
    };

    if !output.status.success() {
        debug!("{} exited with {} for {}", ffprobe_bin, output.status, path.display());
        return None;
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_duration(json: &str) -> Option<Duration> {
    let parsed: MediaInfo = serde_json::from_str(json).ok()?;
    let seconds: f64 = parsed.format?.duration?.trim().parse().ok()?;
    if seconds > 0.0 {
        // Out-of-range metadata (NaN, inf, 1e300) is treated as unknown
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}
