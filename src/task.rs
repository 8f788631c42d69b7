//! Backup and restore workflows sequencing the bridge, archiver and
//! encryptor. Every bridge call is issued one at a time; per-item failures
//! are recovered locally and reported in the run summary.

mod backup;
mod restore;

pub use backup::{BackupOptions, BackupReport, run_backup};
pub use restore::{RestoreOptions, run_restore};
