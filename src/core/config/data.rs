use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Backend endpoint paths. Session-scoped paths use a `{session_id}`
/// placeholder.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub app_config: String,
    pub theme: String,
    pub models: String,
    pub tools: String,
    pub data_sources: String,
    pub create_session: String,
    pub message: String,
    pub download: String,
    pub websocket: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            app_config: "/api/config".to_string(),
            theme: "/api/theme/config".to_string(),
            models: "/llms".to_string(),
            tools: "/api/tools".to_string(),
            data_sources: "/api/data-sources".to_string(),
            create_session: "/chat".to_string(),
            message: "/chat/{session_id}/message".to_string(),
            download: "/chat/{session_id}/download".to_string(),
            websocket: "/ws".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// HTTP base URL of the chat backend
    pub base_url: Option<String>,
    /// Explicit realtime channel URL; derived from `base_url` when unset
    pub ws_url: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Fixed delay between realtime reconnect attempts
    pub reconnect_delay_ms: Option<u64>,
    /// Consecutive failed attempts before giving up; 0 retries forever
    pub max_reconnect_attempts: Option<u32>,
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_tools: Vec<String>,
    #[serde(default)]
    pub default_data_sources: Vec<String>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(
            self.reconnect_delay_ms
                .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
        )
    }

    /// `None` means unlimited retries.
    pub fn max_reconnect_attempts(&self) -> Option<u32> {
        match self
            .max_reconnect_attempts
            .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS)
        {
            0 => None,
            limit => Some(limit),
        }
    }
}
