use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_regex::{Lazy, Regex, lazy_regex};
use tokio::fs;
use tracing::{Span, debug, instrument, warn};

use super::Adb;
use crate::{
    models::{
        DevicePath, InstallClass, InstallOutcome, PackageName, PackageRecord, Resolution,
    },
    platform::PullStrategy,
};

/// Prefix the bridge puts on package-listing and path lines.
const PACKAGE_LINE_PREFIX: &str = "package:";

/// Tokens marking an install that failed only because the package is already
/// present at this or a higher version. With `-d -r` passed these are the
/// benign cases.
static INSTALL_EXISTS_REGEX: Lazy<Regex> =
    lazy_regex!(r"(?i)INSTALL_FAILED_(ALREADY_EXISTS|VERSION_DOWNGRADE)");

impl Adb {
    /// Lists installed package identifiers, filtered by install class.
    ///
    /// Filtering is entirely the bridge's job; the parser only strips the
    /// line prefix.
    #[instrument(level = "debug", skip(self), fields(count), err)]
    pub async fn list_packages(&self, filter: InstallClass) -> Result<Vec<PackageName>> {
        let mut args = vec!["shell", "pm", "list", "packages"];
        if let Some(flag) = filter.flag() {
            args.push(flag);
        }
        let output = self.run(&args).await.context("Failed to list packages")?;
        let packages = parse_package_list(&output);
        Span::current().record("count", packages.len());
        Ok(packages)
    }

    /// Returns the on-device storage path for a single package.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn package_path(&self, package: &PackageName) -> Result<DevicePath> {
        let output = self
            .run(&["shell", "pm", "path", package.as_str()])
            .await
            .with_context(|| format!("Failed to run 'pm path' for {package}"))?;
        parse_package_path(&output)
            .with_context(|| format!("No path reported for package '{package}'"))
    }

    /// Resolves the device path for every listed package, pairing identifier
    /// and path in a single record. A failed lookup becomes a `Skipped`
    /// entry; the batch never aborts on one bad package.
    #[instrument(level = "debug", skip(self, packages))]
    pub async fn resolve_records(&self, packages: &[PackageName]) -> Vec<Resolution> {
        let mut records = Vec::with_capacity(packages.len());
        for package in packages {
            match self.package_path(package).await {
                Ok(path) => records.push(Resolution::Resolved(PackageRecord {
                    name: package.clone(),
                    device_path: path,
                })),
                Err(e) => {
                    warn!(package = %package, "Path is not valid for package, skipping");
                    records.push(Resolution::Skipped {
                        name: package.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        records
    }

    /// Pulls one package file from the device into the fixed handoff file.
    ///
    /// Windows bridges use the direct `pull` subcommand, which writes into
    /// the working directory. Elsewhere the file is read with `shell cat`
    /// and stdout captured, because direct pull is broken on non-Windows
    /// bridge builds for devices past Nougat.
    ///
    /// Returns the handoff path; the caller renames it to its final name. A
    /// handoff file missing after a successful invocation is the caller's
    /// warning case, not an error here.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn pull(&self, path: &DevicePath) -> Result<PathBuf> {
        let handoff = self.handoff_path();
        // A stale handoff file from an earlier failed pull would otherwise
        // be renamed as if it were this package's payload.
        if fs::try_exists(&handoff).await.unwrap_or(false) {
            debug!(path = %handoff.display(), "Removing stale handoff file");
            fs::remove_file(&handoff).await.with_context(|| {
                format!("Failed to remove stale handoff file {}", handoff.display())
            })?;
        }
        match self.platform().pull_strategy() {
            PullStrategy::DirectPull => {
                self.run(&["pull", path.as_str()]).await.context("Pull command failed")?;
            }
            PullStrategy::ShellCat => {
                let bytes = self
                    .run_raw_stdout(&["shell", "cat", path.as_str()])
                    .await
                    .context("Reading file contents over shell failed")?;
                fs::write(&handoff, bytes).await.with_context(|| {
                    format!("Failed to write handoff file {}", handoff.display())
                })?;
            }
        }
        Ok(handoff)
    }

    /// Installs a local APK on the device and classifies the result.
    ///
    /// `-d` allows version downgrade and `-r` replaces an existing install;
    /// both exist to neutralize bridge errors that are not real failures.
    /// The outcome is per-item data, so a nonzero exit is classified from
    /// its output instead of propagated.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn install(&self, apk: &Path) -> Result<InstallOutcome> {
        let apk_str = apk.to_str().context("APK path is not valid UTF-8")?;
        let output = self.exec(&["install", "-d", "-r", apk_str]).await?;
        if !output.success && output.text.is_empty() {
            warn!("Install returned an error code but no output");
            return Ok(InstallOutcome::Failed);
        }
        Ok(classify_install_output(&output.text))
    }
}

/// Keeps only `package:`-prefixed lines; the identifier is everything after
/// the first colon, trimmed. Warning lines the bridge mixes into a listing
/// carry no prefix and are skipped. Order preserved, no dedup.
pub fn parse_package_list(output: &str) -> Vec<PackageName> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix(PACKAGE_LINE_PREFIX))
        .map(|rest| PackageName::new(rest.trim()))
        .collect()
}

/// Extracts the path from a `pm path` response.
pub fn parse_package_path(output: &str) -> Option<DevicePath> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix(PACKAGE_LINE_PREFIX))
        .map(str::trim)
        .find(|path| !path.is_empty())
        .map(DevicePath::new)
}

/// Classifies install output by case-insensitive token search.
///
/// The already-exists tokens are checked before the generic failure tokens,
/// since the bridge reports them inside a `Failure [...]` line. Output with
/// no recognizable token is reported as a failure rather than guessed as a
/// success.
pub fn classify_install_output(output: &str) -> InstallOutcome {
    if INSTALL_EXISTS_REGEX.is_match(output) {
        return InstallOutcome::AlreadyExists;
    }
    let lower = output.to_lowercase();
    if lower.contains("failure") || lower.contains("failed") {
        InstallOutcome::Failed
    } else if lower.contains("success") {
        InstallOutcome::Installed
    } else {
        InstallOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_list_keeps_only_prefixed_lines() {
        let output = "\
* daemon not running; starting now at tcp:5037\n\
* daemon started successfully\n\
package:com.skype.raider\n\
package: com.dog.raider \n\
some warning without prefix\n\
package:com.android.chrome";
        let packages = parse_package_list(output);
        assert_eq!(
            packages,
            vec![
                PackageName::new("com.skype.raider"),
                PackageName::new("com.dog.raider"),
                PackageName::new("com.android.chrome"),
            ]
        );
    }

    #[test]
    fn package_list_does_not_second_guess_the_flag() {
        // A mixed response (whatever the flag was) comes back verbatim;
        // install-class filtering is the bridge's responsibility.
        let output = "package:com.user.app\npackage:com.sys.app";
        let packages = parse_package_list(output);
        assert_eq!(
            packages,
            vec![PackageName::new("com.user.app"), PackageName::new("com.sys.app")]
        );
    }

    #[test]
    fn package_list_preserves_order_and_duplicates() {
        let output = "package:com.b\npackage:com.a\npackage:com.b";
        let names: Vec<_> =
            parse_package_list(output).into_iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(names, vec!["com.b", "com.a", "com.b"]);
    }

    #[test]
    fn package_path_strips_prefix() {
        let output = "package:/data/app/com.dog.raider-2/base.apk\n";
        assert_eq!(
            parse_package_path(output),
            Some(DevicePath::new("/data/app/com.dog.raider-2/base.apk"))
        );
    }

    #[test]
    fn package_path_skips_unprefixed_noise() {
        let output = "some daemon chatter\npackage:/data/app/com.a-1/base.apk";
        assert_eq!(
            parse_package_path(output),
            Some(DevicePath::new("/data/app/com.a-1/base.apk"))
        );
        assert_eq!(parse_package_path("no path here"), None);
        assert_eq!(parse_package_path(""), None);
    }

    #[test]
    fn install_success_token() {
        let output = "Performing Streamed Install\nSuccess";
        assert_eq!(classify_install_output(output), InstallOutcome::Installed);
    }

    #[test]
    fn install_failure_tokens_are_case_insensitive() {
        assert_eq!(
            classify_install_output("Failure [INSTALL_FAILED_INVALID_APK]"),
            InstallOutcome::Failed
        );
        assert_eq!(
            classify_install_output("adb: failed to install app.apk"),
            InstallOutcome::Failed
        );
    }

    #[test]
    fn install_already_exists_wins_over_generic_failure() {
        // The token sits inside a Failure line; it must be recognized before
        // the generic failure tokens match.
        let output = "Failure [INSTALL_FAILED_ALREADY_EXISTS: Attempt to re-install \
                      com.dog.raider without first uninstalling.]";
        assert_eq!(classify_install_output(output), InstallOutcome::AlreadyExists);
        assert_eq!(
            classify_install_output(
                "Failure [INSTALL_FAILED_VERSION_DOWNGRADE: Downgrade detected]"
            ),
            InstallOutcome::AlreadyExists
        );
    }

    #[test]
    fn install_unrecognized_output_is_a_failure() {
        assert_eq!(classify_install_output("???"), InstallOutcome::Failed);
        assert_eq!(classify_install_output(""), InstallOutcome::Failed);
    }
}
