pub mod device;

use std::{
    path::{Path, PathBuf},
    process::Output,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use tokio::{
    process::Command,
    time::{sleep, timeout},
};
use tracing::{info, instrument, trace, warn};

use crate::{models::ConnectionState, platform::Platform};

/// Fixed name of the single-slot handoff file a pull writes into. Every pull
/// reuses the same name, so pulls cannot overlap.
pub const PULL_HANDOFF_NAME: &str = "base.apk";

/// Thin wrapper around the external ADB executable.
///
/// Owns the resolved binary path, the detected host platform and a working
/// directory used as the pull handoff location. Constructed once at startup
/// from explicit configuration; there is no module-level state.
#[derive(Debug, Clone)]
pub struct Adb {
    path: PathBuf,
    platform: Platform,
    work_dir: PathBuf,
}

/// Exit classification and merged output of one bridge invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub text: String,
}

impl Adb {
    pub fn new(path: PathBuf, platform: Platform, work_dir: PathBuf) -> Self {
        Self { path, platform, work_dir }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Path of the pull handoff file inside the working directory.
    pub fn handoff_path(&self) -> PathBuf {
        self.work_dir.join(PULL_HANDOFF_NAME)
    }

    /// Spawns the bridge with the given arguments, capturing exit status and
    /// merged stdout/stderr. Only spawning itself can fail here; a nonzero
    /// exit is data for the caller to interpret.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn exec(&self, args: &[&str]) -> Result<CommandOutput> {
        trace!(path = %self.path.display(), "Invoking bridge");
        let output = Command::new(&self.path)
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .with_context(|| {
                format!("Failed to run {} {}", self.path.display(), args.join(" "))
            })?;
        Ok(CommandOutput { success: output.status.success(), text: merged_text(&output) })
    }

    /// Runs a bridge command, failing when the bridge reports an error.
    ///
    /// A nonzero exit with output becomes an error carrying that output. A
    /// nonzero exit with empty output is only logged as a warning: some
    /// subcommands report nothing on failure.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.exec(args).await?;
        if !output.success {
            if output.text.is_empty() {
                warn!(?args, "Bridge returned an error code but no output");
                return Ok(String::new());
            }
            bail!("Bridge command `{}` failed: {}", args.join(" "), output.text);
        }
        Ok(output.text)
    }

    /// Runs a bridge command and returns raw stdout bytes. Used for the
    /// `shell cat` pull variant, where stderr must not be merged into the
    /// captured file contents.
    #[instrument(level = "debug", skip(self), err)]
    pub(crate) async fn run_raw_stdout(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(&self.path)
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .with_context(|| {
                format!("Failed to run {} {}", self.path.display(), args.join(" "))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Bridge command `{}` failed: {}", args.join(" "), stderr.trim());
        }
        Ok(output.stdout)
    }

    /// Starts the ADB server, bounded by a fixed timeout.
    #[instrument(skip(self), err)]
    pub async fn start_server(&self) -> Result<()> {
        info!("Starting ADB server...");
        match timeout(Duration::from_secs(10), self.run(&["start-server"])).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => bail!("Timed out while starting ADB server"),
        }
    }

    /// Kills the ADB server. Errors are logged and swallowed.
    #[instrument(skip(self))]
    pub async fn kill_server(&self) {
        info!("Killing ADB server...");
        if let Err(e) = self.run(&["kill-server"]).await {
            warn!(error = %format!("{e:#}"), "Failed to kill ADB server");
        }
    }

    /// Queries the current device connection state.
    ///
    /// Derived fresh on every call, never cached. "No device" responses are
    /// ordinary output, not errors.
    #[instrument(level = "debug", skip(self), ret)]
    pub async fn state(&self) -> ConnectionState {
        match self.exec(&["get-state"]).await {
            Ok(output)
                if output.success && output.text.lines().any(|l| l.trim() == "device") =>
            {
                ConnectionState::Connected
            }
            Ok(_) => ConnectionState::Disconnected,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "get-state invocation failed");
                ConnectionState::Disconnected
            }
        }
    }

    /// Polls the connection state until a device shows up.
    ///
    /// A zero `wait_timeout` waits forever.
    #[instrument(skip(self), err)]
    pub async fn wait_for_device(
        &self,
        wait_timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        info!("Make sure your Android device is connected and USB debugging is enabled");
        let started = Instant::now();
        loop {
            if self.state().await == ConnectionState::Connected {
                info!("Device connected");
                return Ok(());
            }
            if !wait_timeout.is_zero() && started.elapsed() >= wait_timeout {
                bail!("No device connected after {}s", wait_timeout.as_secs());
            }
            sleep(interval).await;
        }
    }
}

fn merged_text(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr);
    }
    text
}
