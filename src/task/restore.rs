use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use humansize::{DECIMAL, format_size};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::{
    adb::Adb,
    archive, crypto,
    models::{InstallOutcome, RestoreSummary},
    settings::Settings,
    utils::format_elapsed,
};

/// Options controlling one restore run.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Backup source: a directory, a zip archive or an encrypted archive.
    pub source: PathBuf,
    /// Delete intermediate extraction/decryption artifacts afterwards.
    pub clean: bool,
    /// Passphrase for encrypted archives.
    pub passphrase: Option<String>,
    /// Treat a failed install as a hard error instead of recording it.
    pub strict: bool,
}

/// Runs the restore workflow: start server, wait for a device, classify the
/// source, normalize names, report the total size, install everything and
/// tally the outcomes.
#[instrument(skip(adb, settings, options), err)]
pub async fn run_restore(
    adb: &Adb,
    settings: &Settings,
    options: &RestoreOptions,
) -> Result<RestoreSummary> {
    let started = Instant::now();
    if !fs::try_exists(&options.source).await.unwrap_or(false) {
        bail!("Backup source {} does not exist", options.source.display());
    }

    adb.start_server().await?;
    let result = restore_from(adb, settings, options).await;
    adb.kill_server().await;
    let summary = result?;

    info!(elapsed = %format_elapsed(started.elapsed()), "Restore done");
    Ok(summary)
}

async fn restore_from(
    adb: &Adb,
    settings: &Settings,
    options: &RestoreOptions,
) -> Result<RestoreSummary> {
    adb.wait_for_device(settings.connect_timeout(), settings.poll_interval()).await?;

    let mut cleanup: Vec<PathBuf> = Vec::new();
    let apk_dir =
        resolve_source(&options.source, options.passphrase.as_deref(), &mut cleanup).await?;

    let apks = normalize_names(&apk_dir).await?;
    if apks.is_empty() {
        warn!(path = %apk_dir.display(), "No .apk files found in backup");
    }

    let mut total_size = 0u64;
    for apk in &apks {
        total_size += fs::metadata(apk)
            .await
            .with_context(|| format!("Failed to stat {}", apk.display()))?
            .len();
    }
    info!("Total installation size: {}", format_size(total_size, DECIMAL));

    let mut summary = RestoreSummary::default();
    let total = apks.len();
    for (index, apk) in apks.iter().enumerate() {
        let name = apk.file_name().and_then(|n| n.to_str()).unwrap_or("<unnamed>");
        info!("[{:4}/{:4}] Installing {}", index + 1, total, name);
        let outcome = match adb.install(apk).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(apk = name, error = %format!("{e:#}"), "Install invocation failed");
                InstallOutcome::Failed
            }
        };
        if outcome == InstallOutcome::Failed && options.strict {
            bail!("Installing {name} failed");
        }
        summary.record(outcome);
    }

    info!("Summary: {summary}");

    if options.clean {
        for path in &cleanup {
            debug!(path = %path.display(), "Removing intermediate artifact");
            let result = if path.is_dir() {
                fs::remove_dir_all(path).await
            } else {
                fs::remove_file(path).await
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "Failed to remove intermediate artifact");
            }
        }
    }

    Ok(summary)
}

/// Classifies the restore source and produces the directory of APKs to
/// install, extracting or decrypting as needed. Intermediate files and
/// directories are appended to `cleanup`; the user's own source never is.
async fn resolve_source(
    source: &Path,
    passphrase: Option<&str>,
    cleanup: &mut Vec<PathBuf>,
) -> Result<PathBuf> {
    if source.is_dir() {
        info!(path = %source.display(), "Restoring backup from directory");
        return Ok(source.to_path_buf());
    }
    if crypto::is_encrypted_archive(source) {
        info!(path = %source.display(), "Restoring backup from encrypted archive");
        let passphrase =
            passphrase.context("Encrypted archive requires a passphrase (--password)")?;
        let zip_path = source.with_extension("zip");
        info!("Decrypting backup, this may take a while...");
        crypto::decrypt(source, &zip_path, passphrase).await?;
        cleanup.push(zip_path.clone());
        let dest = extract_archive(&zip_path).await?;
        cleanup.push(dest.clone());
        return Ok(dest);
    }
    if archive::is_zip(source) {
        info!(path = %source.display(), "Restoring backup from zip archive");
        let dest = extract_archive(source).await?;
        cleanup.push(dest.clone());
        return Ok(dest);
    }
    bail!(
        "Backup source {} is neither a directory, a zip archive nor an encrypted archive",
        source.display()
    )
}

async fn extract_archive(archive_path: &Path) -> Result<PathBuf> {
    let dest = archive_path.with_extension("");
    info!(path = %dest.display(), "Unzipping backup archive...");
    archive::extract(archive_path, &dest).await?;
    Ok(dest)
}

/// Lists the `.apk` files in `dir`, first renaming any whose name contains
/// whitespace to use underscores. The bridge's install subcommand is
/// unreliable with space-containing paths on some platforms.
async fn normalize_names(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut apks = Vec::new();
    let mut rd = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if !path.is_file()
            || !path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("apk"))
        {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "Skipping file with a non-UTF-8 name");
            continue;
        };
        if name.contains(char::is_whitespace) {
            let fixed_name = name.replace(char::is_whitespace, "_");
            let fixed = dir.join(&fixed_name);
            info!("Fixing name: {name} -> {fixed_name}");
            fs::rename(&path, &fixed)
                .await
                .with_context(|| format!("Failed to rename {}", path.display()))?;
            apks.push(fixed);
        } else {
            apks.push(path);
        }
    }
    apks.sort();
    Ok(apks)
}
