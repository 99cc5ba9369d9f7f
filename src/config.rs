use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::nfc::TagPolicy;
use crate::nfc::flow::CheckInOptions;

pub const DEFAULT_API_URL: &str = "https://care-tracker-api-production.up.railway.app";

/// Overrides `api_base_url` when set, for staging servers.
pub const API_URL_ENV: &str = "CARE_TRACKER_API_URL";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("care-tracker")
}

fn default_request_timeout() -> u64 {
    15
}

fn default_nfc_timeout() -> u64 {
    10
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct CareConfig {
    pub api_base_url: String,
    pub data_directory: PathBuf,
    pub request_timeout_secs: u64,
    pub nfc_timeout_secs: u64,
    /// Only accept tags whose text record names the task.
    pub require_tag_match: bool,
    pub debug_logging: bool,
}

impl Default for CareConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            data_directory: default_data_dir(),
            request_timeout_secs: default_request_timeout(),
            nfc_timeout_secs: default_nfc_timeout(),
            require_tag_match: false,
            debug_logging: false,
        }
    }
}

impl CareConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("care-tracker").join("config.json"))
    }

    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env_override(std::env::var(API_URL_ENV).ok());
        config
    }

    /// A missing file gives the defaults; so does a malformed one, with a warning.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to encode config: {}", e))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to save config: {}", e))
    }

    fn apply_env_override(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_directory.join("preferences.json")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn check_in_options(&self, nfc_enabled: bool) -> CheckInOptions {
        CheckInOptions {
            timeout: Duration::from_secs(self.nfc_timeout_secs),
            policy: if self.require_tag_match {
                TagPolicy::MatchTaskId
            } else {
                TagPolicy::AnyTag
            },
            enabled: nfc_enabled,
        }
    }
}
