//! Steam library discovery.
//!
//! Steam records every library folder in `steamapps/libraryfolders.vdf` under its
//! install root:
//!
//! ```text
//! "libraryfolders"
//! {
//!     "0"
//!     {
//!         "path"      "C:\\Program Files (x86)\\Steam"
//!         ...
//!     }
//!     "1"
//!     {
//!         "path"      "D:\\SteamLibrary"
//!     }
//! }
//! ```
//!
//! Each library keeps one folder per game under `steamapps/common`, and only the
//! executables sitting directly in that folder are considered. A game that nests
//! its executable deeper is not discovered.

use crate::models::{GameExecutable, Launcher};
use crate::services::library_scanner::{
    GameLibrary, ScanContext, find_first_with_marker, game_from_path, is_executable,
    read_dir_sorted,
};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::sync::Arc;

/// Install folder name appended to each layout prefix.
pub const STEAM_FOLDER: &str = "Steam";

/// Executable proving a candidate is a Steam install.
pub const STEAM_MARKER: &str = "steam.exe";

pub struct SteamLibrary {
    context: Arc<ScanContext>,

    /// Matches `"path"   "<value>"`, capturing the still-escaped value
    path_pattern: Regex,
}

impl SteamLibrary {
    pub fn new(context: Arc<ScanContext>) -> Self {
        Self {
            context,
            path_pattern: Regex::new(r#""path"\s+"((?:[^"\\]|\\.)*)""#)
                .expect("Invalid libraryfolders path regex"),
        }
    }

    /// Location of the library manifest under an install root.
    pub fn manifest_path(install_root: &Utf8Path) -> Utf8PathBuf {
        install_root.join("steamapps").join("libraryfolders.vdf")
    }

    /// Library folders listed in a manifest, in file order.
    pub fn parse_library_folders(&self, manifest: &str) -> Vec<Utf8PathBuf> {
        self.path_pattern
            .captures_iter(manifest)
            .map(|caps| Utf8PathBuf::from(unescape_vdf(&caps[1])))
            .collect()
    }

    fn read_library_folders(&self, install_root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let manifest_path = Self::manifest_path(install_root);
        let manifest = fs::read(&manifest_path)
            .with_context(|| format!("Failed to read Steam manifest: {}", manifest_path))?;

        // The manifest is nominally UTF-8; tolerate stray bytes the same way the client does
        let manifest = String::from_utf8_lossy(&manifest);
        Ok(self.parse_library_folders(&manifest))
    }

    /// Executables directly inside each `steamapps/common/<game>` folder of one library.
    fn library_executables(&self, library: &Utf8Path) -> Vec<GameExecutable> {
        let common = library.join("steamapps").join("common");
        if !common.is_dir() {
            tracing::debug!("Steam library {} has no steamapps/common", library);
            return Vec::new();
        }

        read_dir_sorted(&common)
            .into_iter()
            .filter(|game_dir| game_dir.is_dir())
            .flat_map(|game_dir| read_dir_sorted(&game_dir))
            .filter(|path| path.is_file() && is_executable(path))
            .filter_map(|path| game_from_path(path, Launcher::Steam))
            .collect()
    }
}

impl GameLibrary for SteamLibrary {
    fn launcher(&self) -> Launcher {
        Launcher::Steam
    }

    fn find_install_root(&self) -> Option<Utf8PathBuf> {
        let candidates = self.context.candidate_paths(STEAM_FOLDER);
        find_first_with_marker(&candidates, STEAM_MARKER)
    }

    fn enumerate_games(&self, install_root: &Utf8Path) -> Vec<GameExecutable> {
        let libraries = match self.read_library_folders(install_root) {
            Ok(libraries) => libraries,
            Err(e) => {
                tracing::warn!("Skipping Steam games: {:#}", e);
                return Vec::new();
            }
        };

        tracing::debug!("Steam library folders: {:?}", libraries);

        let executables = libraries
            .iter()
            .flat_map(|library| self.library_executables(library))
            .collect();

        self.context.denylist.filter(executables)
    }
}

/// Undo VDF string escaping (`\\` → `\`, `\"` → `"`).
fn unescape_vdf(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
