use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use tracing::debug;

/// Resolves the bridge executable: explicit override first, then the bundled
/// binary next to our own executable, then `PATH`.
pub fn resolve_adb_path(explicit: Option<&Path>, bundled_relative: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        ensure!(path.is_file(), "ADB binary not found at {}", path.display());
        return Ok(path.to_path_buf());
    }
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let bundled = dir.join(bundled_relative);
        if bundled.is_file() {
            debug!(path = %bundled.display(), "Using bundled ADB binary");
            return Ok(bundled);
        }
    }
    which::which("adb")
        .context("ADB binary not found (no override, no bundled copy, not on PATH)")
}

/// Formats an elapsed duration as `HH:MM:SS.cc`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let hours = (total / 3600.0) as u64;
    let minutes = ((total % 3600.0) / 60.0) as u64;
    let seconds = total % 60.0;
    format!("{hours:02}:{minutes:02}:{seconds:05.2}")
}
