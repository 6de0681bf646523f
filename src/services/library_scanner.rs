//! Shared machinery for locating launcher installs and filtering their executables.
//!
//! Launchers are found heuristically: every mounted volume is combined with a fixed,
//! ordered list of folder layouts (vendor default first, then the custom layouts
//! users commonly pick) and the first candidate holding the launcher's marker
//! executable wins.
//!
//! Scanning never fails. Unreadable directories and broken manifests are logged
//! and contribute nothing to the result.

use crate::models::{GameExecutable, Launcher, ScanSettings};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;

/// Folder layouts probed under each partition, in priority order.
/// The empty entry is the partition root itself.
pub const INSTALL_PREFIXES: &[&str] = &[
    "Program Files (x86)",
    "Program Files",
    "",
    "Games",
    "My Programs",
    "Launchers",
    "Launcher",
    "launchers",
    "launcher",
];

/// A launcher library that can be located and enumerated.
pub trait GameLibrary: Send + Sync {
    fn launcher(&self) -> Launcher;

    /// First candidate install root holding the launcher's marker executable.
    fn find_install_root(&self) -> Option<Utf8PathBuf>;

    /// Games under an install root, denylisted executables already removed.
    fn enumerate_games(&self, install_root: &Utf8Path) -> Vec<GameExecutable>;

    /// Locate the launcher and enumerate it. `None` when it is not installed.
    fn scan(&self) -> Option<Vec<GameExecutable>> {
        let root = self.find_install_root()?;
        tracing::info!("Found {} installation at {}", self.launcher(), root);
        Some(self.enumerate_games(&root))
    }
}

/// Case-sensitive substring filter for installer/helper/anticheat binaries.
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    markers: Vec<String>,
}

impl Denylist {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn is_denied(&self, file_name: &str) -> bool {
        self.markers.iter().any(|marker| file_name.contains(marker.as_str()))
    }

    /// Keep only executables whose file name carries no marker.
    pub fn filter(&self, games: Vec<GameExecutable>) -> Vec<GameExecutable> {
        games
            .into_iter()
            .filter(|game| {
                let denied = self.is_denied(game.file_name());
                if denied {
                    tracing::debug!("Skipping auxiliary executable {}", game.path);
                }
                !denied
            })
            .collect()
    }
}

/// Partitions and denylist shared by every launcher scanner.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub partitions: Vec<Utf8PathBuf>,
    pub denylist: Denylist,
}

impl ScanContext {
    pub fn new(partitions: Vec<Utf8PathBuf>, denylist: Denylist) -> Self {
        Self {
            partitions,
            denylist,
        }
    }

    /// Build from settings, asking the OS for partitions unless they are configured.
    pub fn from_settings(settings: &ScanSettings) -> Arc<Self> {
        let partitions = if settings.partitions.is_empty() {
            system_partitions()
        } else {
            settings.partitions.iter().map(Utf8PathBuf::from).collect()
        };

        tracing::debug!("Scanning partitions: {:?}", partitions);
        Arc::new(Self::new(partitions, Denylist::new(settings.denylist.clone())))
    }

    /// `partition × prefix × relative`, partitions in enumeration order.
    pub fn candidate_paths(&self, relative: &str) -> Vec<Utf8PathBuf> {
        self.partitions
            .iter()
            .flat_map(|partition| {
                INSTALL_PREFIXES.iter().map(move |prefix| {
                    if prefix.is_empty() {
                        partition.join(relative)
                    } else {
                        partition.join(prefix).join(relative)
                    }
                })
            })
            .collect()
    }
}

/// Mount points reported by the OS, in its order.
pub fn system_partitions() -> Vec<Utf8PathBuf> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter_map(|disk| Utf8PathBuf::from_path_buf(disk.mount_point().to_path_buf()).ok())
        .collect()
}

/// First candidate containing `marker`. Stops probing at the first hit.
pub fn find_first_with_marker(candidates: &[Utf8PathBuf], marker: &str) -> Option<Utf8PathBuf> {
    candidates
        .iter()
        .find(|candidate| candidate.join(marker).is_file())
        .cloned()
}

pub fn is_executable(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

/// Entries of `dir` sorted by name; empty when unreadable.
pub fn read_dir_sorted(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot list {}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut paths: Vec<Utf8PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .collect();
    paths.sort();
    paths
}

/// Build a [`GameExecutable`] from a path, naming it after the file stem.
pub fn game_from_path(path: Utf8PathBuf, launcher: Launcher) -> Option<GameExecutable> {
    let name = path.file_stem()?.to_string();
    Some(GameExecutable {
        name,
        path,
        launcher,
    })
}
