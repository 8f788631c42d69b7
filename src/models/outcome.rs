use std::fmt;

/// Per-package result of an install attempt, classified from bridge output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// The package is already present at this or a higher version. Not a
    /// real failure; reported separately in the summary.
    AlreadyExists,
    Failed,
}

/// Aggregated counts for one restore run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub installed: usize,
    pub already_exists: usize,
    pub failed: usize,
}

impl RestoreSummary {
    pub fn record(&mut self, outcome: InstallOutcome) {
        match outcome {
            InstallOutcome::Installed => self.installed += 1,
            InstallOutcome::AlreadyExists => self.already_exists += 1,
            InstallOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.installed + self.already_exists + self.failed
    }
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Installed: {} | Not changed: {} | Failed: {}",
            self.installed, self.already_exists, self.failed
        )
    }
}
