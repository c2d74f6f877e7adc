use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TWITCH_RTMP_BASE: &str = "rtmp://live.twitch.tv/app";
const DEFAULT_KICK_RTMP_BASE: &str = "rtmps://fa723fc1b171.global-contribute.live-video.net/app";
const MAX_STREAM_FPS: u32 = 240;
const DEFAULT_RUMBLE_RTMP_BASE: &str = "rtmp://rtmp.rumble.com/live";

// A publish target: a platform name plus its ingest URL with the key baked in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub platform: String,
    pub url: String,
    pub stream_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub twitch_stream_key: String,
    pub kick_stream_key: String,
    pub rumble_stream_key: String,
    pub twitch_rtmp_base: String,
    pub kick_rtmp_base: String,
    pub rumble_rtmp_base: String,

    pub stream_bitrate: String,
    pub stream_fps: u32,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,

    pub videos_folder: PathBuf,
    pub overlay_file: PathBuf,

    pub vote_window_seconds: u64,
    pub vote_grace_period_seconds: u64,
    pub vote_options_count: usize,
    // Overrun allowed past the expected runtime before the encoder is killed
    pub watchdog_grace_seconds: u64,

    // Read "platform username choice" lines from stdin as votes
    pub console_votes: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            twitch_stream_key: string("TWITCH_STREAM_KEY", ""),
            kick_stream_key: string("KICK_STREAM_KEY", ""),
            rumble_stream_key: string("RUMBLE_STREAM_KEY", ""),
            twitch_rtmp_base: string("TWITCH_RTMP_BASE", DEFAULT_TWITCH_RTMP_BASE),
            kick_rtmp_base: string("KICK_RTMP_BASE", DEFAULT_KICK_RTMP_BASE),
            rumble_rtmp_base: string("RUMBLE_RTMP_BASE", DEFAULT_RUMBLE_RTMP_BASE),
            stream_bitrate: string("STREAM_BITRATE", "3000k"),
            stream_fps: parse(&lookup, "STREAM_FPS", 30)?,
            ffmpeg_bin: string("FFMPEG_BIN", "ffmpeg"),
            ffprobe_bin: string("FFPROBE_BIN", "ffprobe"),
            videos_folder: PathBuf::from(string("VIDEOS_FOLDER", "videos")),
            overlay_file: PathBuf::from(string("OVERLAY_FILE", "/tmp/watts_overlay.txt")),
            vote_window_seconds: parse(&lookup, "VOTE_WINDOW_SECONDS", 60)?,
            vote_grace_period_seconds: parse(&lookup, "VOTE_GRACE_PERIOD_SECONDS", 5)?,
            vote_options_count: parse(&lookup, "VOTE_OPTIONS_COUNT", 4)?,
            watchdog_grace_seconds: parse(&lookup, "WATCHDOG_GRACE_SECONDS", 120)?,
            console_votes: parse_flag(&lookup, "CONSOLE_VOTES")?,
        })
    }

    // Only platforms with a stream key configured get published to
    pub fn active_destinations(&self) -> Vec<Destination> {
        [
            ("twitch", &self.twitch_rtmp_base, &self.twitch_stream_key),
            ("kick", &self.kick_rtmp_base, &self.kick_stream_key),
            ("rumble", &self.rumble_rtmp_base, &self.rumble_stream_key),
        ]
        .into_iter()
        .filter(|(_, _, key)| !key.is_empty())
        .map(|(platform, base, key)| Destination {
            platform: platform.to_string(),
            url: format!("{}/{}", base.trim_end_matches('/'), key),
            stream_key: key.clone(),
        })
        .collect()
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.active_destinations().is_empty() {
            warnings.push("No stream keys configured - nothing to publish to".to_string());
        }
        if self.vote_options_count < 2 {
            warnings.push(format!(
                "VOTE_OPTIONS_COUNT is {} - a vote needs at least two options",
                self.vote_options_count
            ));
        }
        if self.vote_options_count > 26 {
            warnings.push("VOTE_OPTIONS_COUNT above 26 - only A-Z can be voted for".to_string());
        }
        if !(1..=MAX_STREAM_FPS).contains(&self.stream_fps) {
            warnings.push(format!(
                "STREAM_FPS is {} - expected 1 to {}",
                self.stream_fps, MAX_STREAM_FPS
            ));
        }
        if !self.console_votes {
            warnings.push("No vote sources enabled - every cycle will pick randomly".to_string());
        }
        warnings
    }

    pub fn watchdog_grace(&self) -> Duration {
        Duration::from_secs(self.watchdog_grace_seconds)
    }

    pub fn timings(&self) -> StationTimings {
        StationTimings {
            vote_window: Duration::from_secs(self.vote_window_seconds),
            vote_grace: Duration::from_secs(self.vote_grace_period_seconds),
            vote_options: self.vote_options_count.clamp(1, 26),
            ..StationTimings::default()
        }
    }
}

// Timing constants of one broadcast cycle.
#[derive(Debug, Clone)]
pub struct StationTimings {
    pub vote_window: Duration,
    // Added after the content ends to absorb publish latency
    pub vote_grace: Duration,
    pub vote_options: usize,
    pub tick: Duration,
    pub countdown: Duration,
    pub launch_retry_pause: Duration,
    pub teardown_pause: Duration,
    pub empty_catalog_backoff: Duration,
    pub winner_display: Duration,
    pub default_duration: Duration,
}

impl Default for StationTimings {
    fn default() -> Self {
        Self {
            vote_window: Duration::from_secs(60),
            vote_grace: Duration::from_secs(5),
            vote_options: 4,
            tick: Duration::from_secs(1),
            countdown: Duration::from_secs(10),
            launch_retry_pause: Duration::from_secs(5),
            teardown_pause: Duration::from_secs(2),
            empty_catalog_backoff: Duration::from_secs(10),
            winner_display: Duration::from_secs(5),
            default_duration: Duration::from_secs(300),
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        _ => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "0" | "false" | "no" | "off" => Ok(false),
            "1" | "true" | "yes" | "on" => Ok(true),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: v,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_broadcast_settings() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.vote_window_seconds, 60);
        assert_eq!(config.vote_grace_period_seconds, 5);
        assert_eq!(config.vote_options_count, 4);
        assert_eq!(config.stream_bitrate, "3000k");
        assert_eq!(config.stream_fps, 30);
        assert!(!config.console_votes);
        assert_eq!(config.watchdog_grace(), Duration::from_secs(120));
        assert!(config.active_destinations().is_empty());
    }

    #[test]
    fn destinations_only_for_configured_keys() {
        let config = config_from(&[("TWITCH_STREAM_KEY", "live_123"), ("RUMBLE_STREAM_KEY", "r-9")]).unwrap();
        let destinations = config.active_destinations();
        assert_eq!(destinations.len(), 2);
        assert_eq!(destinations[0].url, "rtmp://live.twitch.tv/app/live_123");
        assert_eq!(destinations[1].platform, "rumble");
        assert_eq!(destinations[1].url, "rtmp://rtmp.rumble.com/live/r-9");
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = config_from(&[("VOTE_WINDOW_SECONDS", "a minute")]).unwrap_err();
        assert!(err.to_string().contains("VOTE_WINDOW_SECONDS"));
    }

    #[test]
    fn flag_accepts_common_spellings() {
        assert!(config_from(&[("CONSOLE_VOTES", "yes")]).unwrap().console_votes);
        assert!(config_from(&[("CONSOLE_VOTES", " TRUE ")]).unwrap().console_votes);
        assert!(!config_from(&[("CONSOLE_VOTES", "0")]).unwrap().console_votes);
        assert!(config_from(&[("CONSOLE_VOTES", "maybe")]).is_err());
    }

    #[test]
    fn validate_warns_without_destinations() {
        let warnings = config_from(&[]).unwrap().validate();
        assert!(warnings.iter().any(|w| w.contains("No stream keys")));

        let warnings = config_from(&[("KICK_STREAM_KEY", "k"), ("CONSOLE_VOTES", "1")])
            .unwrap()
            .validate();
        assert!(warnings.is_empty());
    }

    #[test]
    fn validate_warns_on_unusable_frame_rate() {
        let config = config_from(&[("KICK_STREAM_KEY", "k"), ("CONSOLE_VOTES", "1"), ("STREAM_FPS", "4294967295")])
            .unwrap();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("STREAM_FPS"));

        let zero = config_from(&[("STREAM_FPS", "0")]).unwrap().validate();
        assert!(zero.iter().any(|w| w.contains("STREAM_FPS")));
    }

    #[test]
    fn timings_follow_config() {
        let timings = config_from(&[("VOTE_WINDOW_SECONDS", "45"), ("VOTE_GRACE_PERIOD_SECONDS", "8")])
            .unwrap()
            .timings();
        assert_eq!(timings.vote_window, Duration::from_secs(45));
        assert_eq!(timings.vote_grace, Duration::from_secs(8));
        assert_eq!(timings.tick, Duration::from_secs(1));
    }
}
