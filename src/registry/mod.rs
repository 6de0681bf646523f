//! Persisted game name → DSCP marking registry.
//!
//! The file format is one `KEY=VALUE` pair per line with the reserved `DEFAULT`
//! key written first:
//!
//! ```text
//! DEFAULT=46
//! FortniteClient-Win64-Shipping=46
//! cs2=40
//! ```
//!
//! Mutations only touch memory; [`DscpRegistry::save`] is the commit point.

use crate::models::{DscpValue, FALLBACK_DEFAULT_DSCP, ValidationError, validate_game_name};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fs;

/// Reserved key holding the marking used for newly added games.
pub const DEFAULT_KEY: &str = "DEFAULT";

#[derive(Debug, Clone)]
pub struct DscpRegistry {
    path: Utf8PathBuf,
    default: DscpValue,
    entries: IndexMap<String, DscpValue>,
}

impl DscpRegistry {
    /// An empty registry backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            default: FALLBACK_DEFAULT_DSCP,
            entries: IndexMap::new(),
        }
    }

    /// Create a registry and populate it from its file.
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let mut registry = Self::new(path);
        registry.load()?;
        Ok(registry)
    }

    /// Merge the file's entries into memory.
    ///
    /// Malformed lines are skipped. A missing file is not an error.
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            tracing::info!("DSCP settings file {} not found, starting empty", self.path);
            return Ok(());
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read DSCP settings: {}", self.path))?;

        // Older files may be in a legacy code page
        let content = String::from_utf8_lossy(&bytes);
        let lossy = matches!(content, Cow::Owned(_));
        if lossy {
            tracing::warn!(
                "{} is not valid UTF-8, lines with undecodable names are skipped",
                self.path
            );
        }

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if lossy && line.contains(char::REPLACEMENT_CHARACTER) {
                tracing::warn!(
                    "Skipping undecodable line {} in {}: {:?}",
                    line_no + 1,
                    self.path,
                    line
                );
                continue;
            }

            match parse_line(line) {
                Some((DEFAULT_KEY, value)) => self.default = value,
                Some((name, value)) => {
                    self.entries.insert(name.to_string(), value);
                }
                None => tracing::warn!(
                    "Skipping malformed line {} in {}: {:?}",
                    line_no + 1,
                    self.path,
                    line
                ),
            }
        }

        tracing::info!(
            "Loaded {} DSCP entries from {} (default {})",
            self.entries.len(),
            self.path,
            self.default
        );
        Ok(())
    }

    /// Rewrite the file from memory, `DEFAULT` first.
    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, self.render())
            .with_context(|| format!("Failed to write DSCP settings: {}", self.path))?;

        tracing::debug!("Saved {} DSCP entries to {}", self.entries.len(), self.path);
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = format!("{}={}\n", DEFAULT_KEY, self.default);
        for (name, value) in &self.entries {
            out.push_str(&format!("{}={}\n", name, value));
        }
        out
    }

    /// Stored marking for `name`, or the current default.
    pub fn get(&self, name: &str) -> DscpValue {
        self.entries.get(name).copied().unwrap_or(self.default)
    }

    /// Record a marking given as a raw integer.
    ///
    /// Out-of-range values are rejected and leave the registry untouched.
    pub fn set(&mut self, name: &str, value: i64) -> Result<(), ValidationError> {
        let value = DscpValue::new(value)?;
        self.set_value(name, value)
    }

    /// Record an already validated marking.
    pub fn set_value(&mut self, name: &str, value: DscpValue) -> Result<(), ValidationError> {
        validate_game_name(name)?;
        if name == DEFAULT_KEY {
            self.default = value;
        } else {
            self.entries.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Drop the entry for `name`, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<DscpValue> {
        self.entries.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn default_value(&self) -> DscpValue {
        self.default
    }

    pub fn set_default(&mut self, value: DscpValue) {
        self.default = value;
    }

    /// Forget every game, keeping the default.
    pub fn reset_to_default(&mut self) {
        self.entries.clear();
    }

    /// Per-game entries in insertion order (excludes `DEFAULT`).
    pub fn entries(&self) -> impl Iterator<Item = (&str, DscpValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Split `KEY=VALUE`; exactly one `=` and an in-range integer value.
fn parse_line(line: &str) -> Option<(&str, DscpValue)> {
    let mut parts = line.split('=');
    let (name, value) = (parts.next()?, parts.next()?);
    let name = name.trim();
    if parts.next().is_some() || name.is_empty() {
        return None;
    }
    let value: i64 = value.trim().parse().ok()?;
    DscpValue::new(value).ok().map(|value| (name, value))
}
