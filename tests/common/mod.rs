#![cfg(unix)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use mass_apk::{adb::Adb, platform::Platform, settings::Settings};

/// Writes an executable shell script standing in for the bridge binary.
pub fn write_fake_adb(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("adb");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// An `Adb` wired to the fake bridge, with a dedicated working directory.
///
/// The platform is pinned to Linux so pulls go through the `shell cat`
/// capture path regardless of the test host.
pub fn fake_adb(script: PathBuf, work_dir: &Path) -> Adb {
    fs::create_dir_all(work_dir).unwrap();
    Adb::new(script, Platform::Linux, work_dir.to_path_buf())
}

/// Settings with short poll intervals so tests fail fast.
pub fn fast_settings() -> Settings {
    Settings { connect_timeout_secs: 5, poll_interval_ms: 10, ..Default::default() }
}
