use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Application settings, constructed once at startup and passed by value.
///
/// Loaded from an optional JSON file; individual fields can be overridden by
/// CLI flags before the runner is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Explicit bridge executable path. Overrides the bundled/`PATH` lookup.
    pub adb_path: Option<PathBuf>,
    /// Seconds to wait for a device before giving up. Zero waits forever.
    pub connect_timeout_secs: u64,
    /// Sleep between device state polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { adb_path: None, connect_timeout_secs: 120, poll_interval_ms: 1000 }
    }
}

impl Settings {
    /// Loads settings from `path`, or from the default config location when
    /// `path` is `None`. A missing file yields defaults; a malformed file is
    /// reported and replaced with defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Self::default(),
            },
        };
        if !path.is_file() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Self::default();
        }
        match Self::read(&path) {
            Ok(settings) => {
                debug!(path = %path.display(), ?settings, "Loaded settings");
                settings
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "Failed to load settings, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mass-apk").join("settings.json"))
    }
}
