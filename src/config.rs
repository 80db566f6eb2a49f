use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub api_base: String,
    pub initial_api_key: Option<String>,
    pub data_dir: PathBuf,
    pub media_base_url: String,
    pub poll: PollPolicy,
}

/// Wait policy for long-running video operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_VIDEO_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let port = env::var("BROLL_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let host = non_empty_var("BROLL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_address = format!("{host}:{port}");
        let api_base = non_empty_var("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let poll = PollPolicy {
            interval: secs_var("VIDEO_POLL_INTERVAL_SECS")
                .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            timeout: secs_var("VIDEO_TIMEOUT_SECS")
                .unwrap_or(Duration::from_secs(DEFAULT_VIDEO_TIMEOUT_SECS)),
        };
        Self {
            media_base_url: resolve_media_base_url(&bind_address),
            bind_address,
            api_base,
            initial_api_key: non_empty_var("GEMINI_API_KEY"),
            data_dir: resolve_data_dir(),
            poll,
        }
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn secs_var(name: &str) -> Option<Duration> {
    non_empty_var(name)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_var("DATA_DIR") {
        return PathBuf::from(dir);
    }
    let mut base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("broll-studio");
    base
}

fn resolve_media_base_url(bind_address: &str) -> String {
    if let Some(media_url) = non_empty_var("MEDIA_URL") {
        return media_url.trim_end_matches('/').to_string();
    }
    format!("http://{bind_address}/media")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_policy_waits_ten_seconds_for_ten_minutes() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.timeout, Duration::from_secs(600));
    }

    #[test]
    fn media_url_defaults_to_bind_address() {
        assert_eq!(
            resolve_media_base_url("127.0.0.1:3000"),
            "http://127.0.0.1:3000/media"
        );
    }
}
