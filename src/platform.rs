use std::path::PathBuf;

use anyhow::{Result, bail};
use derive_more::Display;

/// Host platforms with a bundled bridge binary.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    #[display("osx")]
    Osx,
    #[display("linux")]
    Linux,
    #[display("win")]
    Win,
}

/// How a package file is copied off the device on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStrategy {
    /// The bridge's `pull` subcommand, writing into its working directory.
    DirectPull,
    /// `shell cat` with stdout captured into the handoff file. The direct
    /// `pull` subcommand stopped working on non-Windows bridge builds for
    /// devices past Nougat.
    ShellCat,
}

impl Platform {
    /// Detects the host platform. Called once at startup.
    pub fn detect() -> Result<Self> {
        if cfg!(target_os = "macos") {
            Ok(Self::Osx)
        } else if cfg!(target_os = "linux") {
            Ok(Self::Linux)
        } else if cfg!(target_os = "windows") {
            Ok(Self::Win)
        } else {
            bail!("Unsupported host platform: {}", std::env::consts::OS)
        }
    }

    /// Relative path of the bundled bridge executable for this platform.
    pub fn bundled_adb_path(self) -> PathBuf {
        match self {
            Self::Osx => ["bin", "osx", "adb"].iter().collect(),
            Self::Linux => ["bin", "linux", "adb"].iter().collect(),
            Self::Win => ["bin", "win", "adb.exe"].iter().collect(),
        }
    }

    pub fn pull_strategy(self) -> PullStrategy {
        match self {
            Self::Win => PullStrategy::DirectPull,
            Self::Osx | Self::Linux => PullStrategy::ShellCat,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn bundled_path_per_platform() {
        assert_eq!(Platform::Osx.bundled_adb_path(), Path::new("bin/osx/adb"));
        assert_eq!(Platform::Linux.bundled_adb_path(), Path::new("bin/linux/adb"));
        assert_eq!(Platform::Win.bundled_adb_path(), Path::new("bin/win/adb.exe"));
    }

    #[test]
    fn pull_strategy_per_platform() {
        assert_eq!(Platform::Win.pull_strategy(), PullStrategy::DirectPull);
        assert_eq!(Platform::Osx.pull_strategy(), PullStrategy::ShellCat);
        assert_eq!(Platform::Linux.pull_strategy(), PullStrategy::ShellCat);
    }

    #[test]
    fn detect_succeeds_on_supported_hosts() {
        // The test host is one of the three supported platforms.
        let platform = Platform::detect().unwrap();
        assert!(matches!(platform, Platform::Osx | Platform::Linux | Platform::Win));
    }
}
