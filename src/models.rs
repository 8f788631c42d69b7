mod outcome;
mod package;

pub use outcome::{InstallOutcome, RestoreSummary};
pub use package::{
    ConnectionState, DevicePath, InstallClass, PackageName, PackageRecord, Resolution,
};
