//! mass-apk — bulk backup and restore of Android packages over ADB.
//!
//! ```text
//! mass-apk backup [-f all|user|system] [-p DIR] [-a] [-e --password PASS]
//! mass-apk restore -p PATH [-c] [--password PASS] [--strict]
//! ```

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use mass_apk::{
    adb::Adb,
    models::InstallClass,
    platform::Platform,
    settings::Settings,
    task::{BackupOptions, RestoreOptions, run_backup, run_restore},
    utils::resolve_adb_path,
};

#[derive(Parser, Debug)]
#[command(
    name = "mass-apk",
    version,
    about = "Bulk backup and restore of Android application packages over ADB",
    long_about = None,
)]
struct Cli {
    /// Path to the ADB executable (overrides the bundled/config lookup).
    #[arg(long, global = true)]
    adb: Option<PathBuf>,

    /// Settings file to load instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for a device before giving up (0 waits forever).
    #[arg(long, global = true)]
    wait_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull installed packages from the device into a backup.
    Backup(BackupArgs),
    /// Install packages from a backup onto the device.
    Restore(RestoreArgs),
}

#[derive(Args, Debug)]
struct BackupArgs {
    /// Which packages to back up: all, user or system.
    #[arg(short, long, default_value = "user")]
    flag: InstallClass,

    /// Destination directory; defaults to a timestamped name.
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Compress the backup directory into a zip archive.
    #[arg(short, long)]
    archive: bool,

    /// Encrypt the archive (implies --archive). Requires --password.
    #[arg(short, long, requires = "password")]
    encrypt: bool,

    /// Passphrase used with --encrypt.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Backup to restore: a directory, a zip archive or an encrypted archive.
    #[arg(short, long)]
    path: PathBuf,

    /// Remove intermediate extraction artifacts after restoring.
    #[arg(short, long)]
    clean: bool,

    /// Passphrase for encrypted archives.
    #[arg(long)]
    password: Option<String>,

    /// Abort the run on the first failed install.
    #[arg(long)]
    strict: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nReceived interrupt, quitting...");
            ExitCode::from(130)
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref());
    if let Some(adb) = cli.adb {
        settings.adb_path = Some(adb);
    }
    if let Some(secs) = cli.wait_timeout {
        settings.connect_timeout_secs = secs;
    }

    let platform = Platform::detect()?;
    let adb_path = resolve_adb_path(settings.adb_path.as_deref(), &platform.bundled_adb_path())?;
    let work_dir = std::env::temp_dir().join("mass-apk");
    tokio::fs::create_dir_all(&work_dir)
        .await
        .with_context(|| format!("Failed to create working directory {}", work_dir.display()))?;
    let adb = Adb::new(adb_path, platform, work_dir);

    match cli.command {
        Commands::Backup(args) => {
            let options = BackupOptions {
                filter: args.flag,
                dest: args.path,
                archive: args.archive,
                passphrase: if args.encrypt { args.password } else { None },
            };
            run_backup(&adb, &settings, &options).await.map(|_| ())
        }
        Commands::Restore(args) => {
            let options = RestoreOptions {
                source: args.path,
                clean: args.clean,
                passphrase: args.password,
                strict: args.strict,
            };
            run_restore(&adb, &settings, &options).await.map(|_| ())
        }
    }
}
