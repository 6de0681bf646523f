//! Epic Games library discovery.
//!
//! The Epic launcher keeps no manifest we rely on, and publishers lay out their
//! install folders however they like, so every game folder under an
//! `Epic Games` base directory is walked to any depth.
//!
//! Games are not installed under the launcher's own root. They live in sibling
//! `Epic Games` directories on any partition, which is why enumeration looks at
//! every layout prefix rather than at the install root it is handed.

use crate::models::{GameExecutable, Launcher};
use crate::services::library_scanner::{
    GameLibrary, ScanContext, find_first_with_marker, game_from_path, is_executable,
    read_dir_sorted,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Base directory name holding Epic games.
pub const EPIC_FOLDER: &str = "Epic Games";

/// Launcher binary directory relative to a layout prefix.
pub const EPIC_LAUNCHER_DIR: &str = "Epic Games/Launcher/Engine/Binaries/Win64";

/// Executable proving a candidate is an Epic launcher install.
pub const EPIC_MARKER: &str = "EpicGamesLauncher.exe";

/// Entries whose presence marks a base directory as the launcher's own install.
const LAUNCHER_ENTRIES: &[&str] = &["Launcher", "Epic Online Services"];

pub struct EpicLibrary {
    context: Arc<ScanContext>,
}

impl EpicLibrary {
    pub fn new(context: Arc<ScanContext>) -> Self {
        Self { context }
    }

    /// Existing `Epic Games` base directories that hold games.
    pub fn game_base_dirs(&self) -> Vec<Utf8PathBuf> {
        self.context
            .candidate_paths(EPIC_FOLDER)
            .into_iter()
            .filter(|base| base.is_dir())
            .filter(|base| {
                let hosts_launcher = LAUNCHER_ENTRIES
                    .iter()
                    .any(|entry| base.join(entry).exists());
                if hosts_launcher {
                    tracing::debug!("Skipping launcher directory {}", base);
                }
                !hosts_launcher
            })
            .collect()
    }

    /// Every executable below `game_dir`, at any depth.
    fn walk_game_folder(game_dir: &Utf8Path) -> Vec<GameExecutable> {
        WalkDir::new(game_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry under {}: {}", game_dir, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
            .filter(|path| is_executable(path))
            .filter_map(|path| game_from_path(path, Launcher::Epic))
            .collect()
    }
}

impl GameLibrary for EpicLibrary {
    fn launcher(&self) -> Launcher {
        Launcher::Epic
    }

    fn find_install_root(&self) -> Option<Utf8PathBuf> {
        let candidates = self.context.candidate_paths(EPIC_LAUNCHER_DIR);
        find_first_with_marker(&candidates, EPIC_MARKER)
    }

    fn enumerate_games(&self, _install_root: &Utf8Path) -> Vec<GameExecutable> {
        let executables = self
            .game_base_dirs()
            .iter()
            .flat_map(|base| read_dir_sorted(base))
            .filter(|game_dir| game_dir.is_dir())
            .flat_map(|game_dir| Self::walk_game_folder(&game_dir))
            .collect();

        self.context.denylist.filter(executables)
    }
}
