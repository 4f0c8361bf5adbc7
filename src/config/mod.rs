use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_STORAGE_PATH: &str = "./.engagement/storage.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
const DEFAULT_VIDEO_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub storage_path: PathBuf,
    pub video_poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Settings for the session-scoped WebSocket channel
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub ws_base_url: String,
    pub heartbeat_interval: Duration,
    /// 0 disables reconnecting after a dropped transport
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_base_url: ws_url_from_http(DEFAULT_API_BASE_URL),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            max_reconnect_attempts: 0,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let base_url = env::var("API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::InvalidConfiguration(format!(
                "API_BASE_URL must be an http(s) URL, got {}",
                base_url
            )));
        }

        let ws_base_url = env::var("WS_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| ws_url_from_http(&base_url));

        Ok(Self {
            api: ApiConfig {
                base_url,
                request_timeout: Duration::from_secs(parse_var(
                    "REQUEST_TIMEOUT_SECS",
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                )?),
            },
            realtime: RealtimeConfig {
                ws_base_url,
                heartbeat_interval: Duration::from_secs(parse_var(
                    "HEARTBEAT_INTERVAL_SECS",
                    DEFAULT_HEARTBEAT_INTERVAL_SECS,
                )?),
                max_reconnect_attempts: parse_var("RECONNECT_ATTEMPTS", 0)?,
                reconnect_delay: Duration::from_millis(parse_var(
                    "RECONNECT_DELAY_MS",
                    DEFAULT_RECONNECT_DELAY_MS,
                )?),
            },
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| DEFAULT_STORAGE_PATH.to_string())
                .into(),
            video_poll_interval: Duration::from_millis(parse_var(
                "VIDEO_POLL_INTERVAL_MS",
                DEFAULT_VIDEO_POLL_INTERVAL_MS,
            )?),
        })
    }

    /// Points both the REST and WebSocket surfaces at `base_url`
    pub fn with_api_base_url(mut self, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        self.realtime.ws_base_url = ws_url_from_http(&base_url);
        self.api.base_url = base_url;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ClientError::InvalidConfiguration(format!("{} has invalid value {:?}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Derives the WebSocket base from the REST base by swapping the scheme
pub fn ws_url_from_http(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    }
}
