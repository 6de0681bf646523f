use crate::models::marking::DscpValue;
use camino::Utf8PathBuf;
use std::fmt;

/// Third-party game launcher whose library layout we know how to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Launcher {
    /// Filesystem-convention layout, walked recursively.
    Epic,
    /// Manifest-driven layout (`libraryfolders.vdf`).
    Steam,
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launcher::Epic => write!(f, "Epic Games"),
            Launcher::Steam => write!(f, "Steam"),
        }
    }
}

/// An executable found while scanning a launcher library.
///
/// Produced transiently by a scan and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameExecutable {
    /// File stem, used as the policy name.
    pub name: String,
    pub path: Utf8PathBuf,
    pub launcher: Launcher,
}

impl GameExecutable {
    /// File name including the extension, the part the denylist is matched against.
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(&self.name)
    }
}

/// One row of the policy store's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub name: String,
    pub app_path: String,
}

/// A listed policy joined with the marking recorded for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEntry {
    pub name: String,
    pub app_path: String,
    pub marking: DscpValue,
}
