//! Runtime configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::candidates::MAX_DISPLAY;
use crate::error::OverlayError;
use crate::sync::RECONNECT_DELAY;

/// How often the move list is sampled for outbound sync.
pub const PUSH_INTERVAL: Duration = Duration::from_millis(300);

pub const DEFAULT_WS_URL: &str = "ws://localhost:8765";

#[derive(Clone, Debug)]
pub struct CoachConfig {
    /// Websocket URL of the analysis source
    pub ws_url: String,

    /// Document snapshot driven by the headless host
    pub snapshot: Option<PathBuf>,

    pub push_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_display: usize,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            snapshot: None,
            push_interval: PUSH_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
            max_display: MAX_DISPLAY,
        }
    }
}

impl CoachConfig {
    pub fn from_env() -> Result<Self, OverlayError> {
        let ws_url = env::var("COACH_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
        let snapshot = env::var("COACH_SNAPSHOT").ok().map(PathBuf::from);
        Self::default().with_ws_url(ws_url).map(|c| Self { snapshot, ..c })
    }

    /// Replace the analysis source URL; only `ws://` and `wss://` are accepted.
    pub fn with_ws_url(self, ws_url: impl Into<String>) -> Result<Self, OverlayError> {
        let ws_url = ws_url.into();
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(OverlayError::Config("COACH_WS_URL must be a ws:// or wss:// URL"));
        }
        Ok(Self { ws_url, ..self })
    }
}
