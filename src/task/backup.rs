use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use time::{OffsetDateTime, macros::format_description};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::{
    adb::Adb,
    archive, crypto,
    models::{InstallClass, Resolution},
    settings::Settings,
    utils::format_elapsed,
};

/// Options controlling one backup run.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Which install class of packages to back up.
    pub filter: InstallClass,
    /// Destination directory. Defaults to a timestamped name under the
    /// current directory.
    pub dest: Option<PathBuf>,
    /// Compress the finished directory into a zip archive and delete it.
    pub archive: bool,
    /// Encrypt the archive and delete the zip. Implies `archive`.
    pub passphrase: Option<String>,
}

/// Counts reported at the end of a backup run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupReport {
    pub pulled: usize,
    pub skipped: usize,
}

/// Runs the backup workflow: create destination, start server, wait for a
/// device, list, resolve, pull, then optionally archive and encrypt.
///
/// Device state is never mutated. Per-package failures reduce the output
/// count; they do not abort the run.
#[instrument(skip(adb, settings, options), err)]
pub async fn run_backup(
    adb: &Adb,
    settings: &Settings,
    options: &BackupOptions,
) -> Result<BackupReport> {
    let started = Instant::now();
    let dest = match &options.dest {
        Some(path) => path.clone(),
        None => PathBuf::from(default_backup_name()),
    };
    // Refuse to silently merge two backups.
    if fs::try_exists(&dest).await.unwrap_or(false) {
        bail!("Backup destination {} already exists", dest.display());
    }
    fs::create_dir_all(&dest)
        .await
        .with_context(|| format!("Failed to create backup directory {}", dest.display()))?;

    adb.start_server().await?;
    let result = backup_into(adb, settings, options, &dest).await;
    adb.kill_server().await;
    let report = result?;

    info!(elapsed = %format_elapsed(started.elapsed()), "Back up done");
    Ok(report)
}

async fn backup_into(
    adb: &Adb,
    settings: &Settings,
    options: &BackupOptions,
    dest: &Path,
) -> Result<BackupReport> {
    adb.wait_for_device(settings.connect_timeout(), settings.poll_interval()).await?;

    info!(filter = %options.filter, "Listing installed packages on the device...");
    let packages = adb.list_packages(options.filter).await?;

    info!(count = packages.len(), "Discovering package paths, this may take a while...");
    let resolutions = adb.resolve_records(&packages).await;

    let mut report = BackupReport::default();
    let mut records = Vec::new();
    for resolution in resolutions {
        match resolution {
            Resolution::Resolved(record) => records.push(record),
            Resolution::Skipped { name, reason } => {
                warn!(package = %name, reason, "Skipping package without a resolvable path");
                report.skipped += 1;
            }
        }
    }
    info!("Found {} installed packages", records.len());

    let total = records.len();
    for (index, record) in records.iter().enumerate() {
        info!("[{:4}/{:4}] pulling ... {}", index + 1, total, record.name);
        let handoff = match adb.pull(&record.device_path).await {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    package = %record.name,
                    error = %format!("{e:#}"),
                    "Pull failed, continuing with the next package"
                );
                report.skipped += 1;
                continue;
            }
        };
        // Some bridge versions report success without producing a file.
        if !fs::try_exists(&handoff).await.unwrap_or(false) {
            warn!(package = %record.name, "Pull produced no file, continuing");
            report.skipped += 1;
            continue;
        }
        let final_path = dest.join(record.name.apk_file_name());
        fs::rename(&handoff, &final_path).await.with_context(|| {
            format!("Failed to move pulled file to {}", final_path.display())
        })?;
        report.pulled += 1;
    }
    info!("Pulled {} of {} packages ({} skipped)", report.pulled, total, report.skipped);

    if options.archive || options.passphrase.is_some() {
        let archive_path = dest.with_extension("zip");
        info!(path = %archive_path.display(), "Creating zip archive, this may take a while...");
        archive::compress(dest, &archive_path).await?;
        fs::remove_dir_all(dest)
            .await
            .with_context(|| format!("Failed to remove backup directory {}", dest.display()))?;

        if let Some(passphrase) = &options.passphrase {
            let encrypted_path = dest.with_extension("aes");
            info!(path = %encrypted_path.display(), "Encrypting archive, this may take a while...");
            crypto::encrypt(&archive_path, &encrypted_path, passphrase).await?;
            fs::remove_file(&archive_path).await.with_context(|| {
                format!("Failed to remove archive {}", archive_path.display())
            })?;
        }
    }

    Ok(report)
}

fn default_backup_name() -> String {
    let fmt = format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&fmt).unwrap_or_else(|_| "backup".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backup_name_is_a_timestamp() {
        let name = default_backup_name();
        // 2025-11-30_23-59-59
        assert_eq!(name.len(), 19);
        assert_eq!(&name[4..5], "-");
        assert_eq!(&name[10..11], "_");
        assert!(!name.contains(char::is_whitespace));
    }
}
