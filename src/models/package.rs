use std::str::FromStr;

use derive_more::Display;

/// Identifier of an installed application, exactly as reported by the bridge.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
#[display("{_0}")]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the pulled package is stored under.
    pub fn apk_file_name(&self) -> String {
        format!("{}.apk", self.0)
    }
}

/// On-device storage path of a package. Valid for the duration of one run.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{_0}")]
pub struct DevicePath(String);

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A package identifier and its resolved on-device path, carried together.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub name: PackageName,
    pub device_path: DevicePath,
}

/// Result of a per-package path lookup. A miss is an ordinary value so batch
/// loops never depend on error control flow for routine skips.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(PackageRecord),
    Skipped { name: PackageName, reason: String },
}

/// Which install class of packages the lister asks the bridge for.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallClass {
    #[display("all")]
    All,
    #[default]
    #[display("user")]
    User,
    #[display("system")]
    System,
}

impl InstallClass {
    /// Flag token appended to `pm list packages`. `None` means no flag.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::User => Some("-3"),
            Self::System => Some("-S"),
        }
    }
}

impl FromStr for InstallClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => {
                Err(format!("unknown install class '{other}'; expected: all, user, system"))
            }
        }
    }
}

/// Bridge connection state, derived fresh on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_class_flags() {
        assert_eq!(InstallClass::All.flag(), None);
        assert_eq!(InstallClass::User.flag(), Some("-3"));
        assert_eq!(InstallClass::System.flag(), Some("-S"));
    }

    #[test]
    fn install_class_from_str_is_case_insensitive() {
        assert_eq!("ALL".parse::<InstallClass>().unwrap(), InstallClass::All);
        assert_eq!("User".parse::<InstallClass>().unwrap(), InstallClass::User);
        assert_eq!("system".parse::<InstallClass>().unwrap(), InstallClass::System);
        assert!("3rdparty".parse::<InstallClass>().is_err());
    }

    #[test]
    fn apk_file_name_appends_extension() {
        assert_eq!(PackageName::new("com.skype.raider").apk_file_name(), "com.skype.raider.apk");
    }
}
