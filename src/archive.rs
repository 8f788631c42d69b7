use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use tracing::{debug, instrument, warn};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

/// Compresses the `.apk` files directly under `src_dir` into `archive_path`.
///
/// Entries are stored under their base names only, so extraction yields a
/// flat directory no matter where the source directory lived.
#[instrument(skip(src_dir, archive_path), err, level = "debug")]
pub async fn compress(src_dir: &Path, archive_path: &Path) -> Result<()> {
    let src_dir = src_dir.to_path_buf();
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || compress_blocking(&src_dir, &archive_path))
        .await
        .context("Archive task panicked")?
}

fn compress_blocking(src_dir: &Path, archive_path: &Path) -> Result<()> {
    ensure!(src_dir.is_dir(), "Source directory does not exist: {}", src_dir.display());

    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(src_dir)
        .with_context(|| format!("Failed to read {}", src_dir.display()))?
    {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("apk"))
        {
            entries.push(path);
        }
    }
    entries.sort();

    let file = File::create(archive_path)
        .with_context(|| format!("Failed to create archive {}", archive_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Archive entry has no valid name: {}", path.display()))?;
        debug!(entry = name, "Adding archive entry");
        writer
            .start_file(name, options)
            .with_context(|| format!("Failed to start archive entry {name}"))?;
        let mut input =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        io::copy(&mut input, &mut writer)
            .with_context(|| format!("Failed to compress {}", path.display()))?;
    }
    writer.finish().context("Failed to finalize archive")?;
    Ok(())
}

/// Extracts a zip archive into `dest_dir`, creating it if absent.
///
/// Fails fast when the input is not a zip archive. A single unreadable entry
/// is logged and skipped; the remaining entries still extract.
#[instrument(skip(archive, dest_dir), err, level = "debug")]
pub async fn extract(archive: &Path, dest_dir: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest_dir))
        .await
        .context("Extraction task panicked")?
}

fn extract_blocking(archive: &Path, dest_dir: &Path) -> Result<()> {
    ensure!(archive.is_file(), "Archive does not exist: {}", archive.display());
    let file = File::open(archive)
        .with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip archive", archive.display()))?;

    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    for index in 0..zip.len() {
        if let Err(e) = extract_entry(&mut zip, index, dest_dir) {
            warn!(index, error = %format!("{e:#}"), "Failed to extract archive entry, skipping");
        }
    }
    Ok(())
}

fn extract_entry(zip: &mut ZipArchive<File>, index: usize, dest_dir: &Path) -> Result<()> {
    let mut entry = zip.by_index(index)?;
    if entry.is_dir() {
        return Ok(());
    }
    let name = entry
        .enclosed_name()
        .with_context(|| format!("Entry {index} has an unsafe path"))?;
    let file_name =
        name.file_name().with_context(|| format!("Entry {index} has no file name"))?;
    let dest = dest_dir.join(file_name);
    let mut out =
        File::create(&dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    io::copy(&mut entry, &mut out)
        .with_context(|| format!("Failed to extract {}", dest.display()))?;
    Ok(())
}

/// True when the file parses as a zip archive.
pub fn is_zip(path: &Path) -> bool {
    File::open(path).is_ok_and(|file| ZipArchive::new(file).is_ok())
}
