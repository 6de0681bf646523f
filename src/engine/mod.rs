//! Reconciliation between discovered games, the DSCP registry and the policy store.
//!
//! Each game moves through `Absent → PolicyActive(m) → PolicyActive(m') → Absent`.
//! The registry is the persisted record of the markings the user asked for, the
//! store is what the OS actually enforces. Operations on one name are serialized
//! through [`NameLocks`]; the registry is committed to disk with `save()` at the
//! end of each mutating operation.
//!
//! Store failures never abort an operation. They are logged (tracing and the
//! error log) and show up as `false` or in [`DiscoveryReport::failed`].
//! Validation failures are returned before anything is mutated.

pub mod dispatch;
pub mod locks;

pub use dispatch::{Action, ActionOutcome, Dispatcher, DispatcherHandle};
pub use locks::NameLocks;

use crate::logging::ErrorLog;
use crate::metrics::Metrics;
use crate::models::{
    DscpValue, GameEntry, GameExecutable, Launcher, ValidationError, validate_game_name,
};
use crate::registry::DscpRegistry;
use crate::services::library_scanner::GameLibrary;
use crate::services::policy_store::{CommandRunner, PolicyStoreAdapter};
use crate::state::{StateChange, StateManager};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Progress reached once every launcher has been located and enumerated.
const SCAN_DONE: u8 = 10;

/// Progress band per launcher, in processing order.
const LAUNCHER_BANDS: &[(u8, u8)] = &[(10, 60), (60, 90)];

/// Progress at which results are committed.
const FINALIZE: u8 = 90;

/// Outcome of one auto-discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Executables kept after filtering, across all launchers
    pub found: usize,

    /// Policies created and recorded, in processing order
    pub added: Vec<String>,

    /// Names the store refused or failed to confirm
    pub failed: Vec<String>,

    /// Executables whose path vanished between scan and apply
    pub skipped: usize,
}

/// Linear position inside a progress band. An inverted band stays at its start.
fn phase_progress(band: (u8, u8), done: usize, total: usize) -> u8 {
    let (start, end) = band;
    if total == 0 {
        return end.max(start);
    }
    let span = end.saturating_sub(start) as usize;
    start + (span * done.min(total) / total) as u8
}

fn scan_libraries(libraries: &[Box<dyn GameLibrary>]) -> Vec<(Launcher, Vec<GameExecutable>)> {
    libraries
        .iter()
        .map(|library| {
            let games = library.scan().unwrap_or_else(|| {
                tracing::info!("{} is not installed", library.launcher());
                Vec::new()
            });
            tracing::info!("Found {} {} executables", games.len(), library.launcher());
            (library.launcher(), games)
        })
        .collect()
}

pub struct ReconciliationEngine<R: CommandRunner> {
    store: PolicyStoreAdapter<R>,
    registry: Mutex<DscpRegistry>,

    /// Processed in order: the filesystem-walked library first, then the manifest-driven one
    libraries: Arc<Vec<Box<dyn GameLibrary>>>,

    state: StateManager,
    error_log: Arc<ErrorLog>,
    metrics: Arc<Metrics>,
    locks: NameLocks,
}

impl<R: CommandRunner> ReconciliationEngine<R> {
    pub fn new(
        store: PolicyStoreAdapter<R>,
        registry: DscpRegistry,
        libraries: Vec<Box<dyn GameLibrary>>,
        state: StateManager,
        error_log: Arc<ErrorLog>,
        metrics: Arc<Metrics>,
    ) -> Self {
        state.set_default_marking(registry.default_value().get());
        Self {
            store,
            registry: Mutex::new(registry),
            libraries: Arc::new(libraries),
            state,
            error_log,
            metrics,
            locks: NameLocks::new(),
        }
    }

    fn registry(&self) -> MutexGuard<'_, DscpRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the registry to disk. A failure is reported, never raised.
    fn persist(&self) -> bool {
        let result = self.registry().save();
        match result {
            Ok(()) => {
                self.metrics.record_registry_save();
                true
            }
            Err(e) => {
                tracing::error!("Failed to save DSCP settings: {:#}", e);
                self.error_log
                    .append(&format!("Failed to save DSCP settings: {:#}", e));
                false
            }
        }
    }

    /// Store `marking` for `name` and commit. `false` if the registry refused it.
    fn record_marking(&self, name: &str, marking: DscpValue) -> bool {
        if let Err(e) = self.registry().set_value(name, marking) {
            tracing::warn!("Not recording {}: {}", name, e);
            return false;
        }
        self.persist();
        true
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn default_marking(&self) -> DscpValue {
        self.registry().default_value()
    }

    /// Marking recorded for `name`, or the default.
    pub fn marking_for(&self, name: &str) -> DscpValue {
        self.registry().get(name)
    }

    /// Recorded entries in insertion order, `DEFAULT` excluded.
    pub fn recorded(&self) -> Vec<(String, DscpValue)> {
        self.registry()
            .entries()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Locate every launcher and enumerate its games without applying anything.
    pub fn scan(&self) -> Vec<(Launcher, Vec<GameExecutable>)> {
        scan_libraries(&self.libraries)
    }

    /// [`scan`](Self::scan) on the blocking pool; the walks are synchronous I/O.
    async fn scan_blocking(&self) -> Vec<(Launcher, Vec<GameExecutable>)> {
        let libraries = Arc::clone(&self.libraries);
        tokio::task::spawn_blocking(move || scan_libraries(&libraries))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Library scan task failed: {}", e);
                self.error_log
                    .append(&format!("Library scan task failed: {}", e));
                Vec::new()
            })
    }

    /// Scan all launchers and create a policy with the default marking for every
    /// game found. Successfully created policies are recorded and the registry
    /// is saved once at the end.
    pub async fn auto_discover_and_add(&self) -> DiscoveryReport {
        self.state.worker_started();
        self.state.start_discovery();
        self.state.set_progress(0, "Scanning for Steam and Epic Games...");

        let scanned = self.scan_blocking().await;
        let marking = self.default_marking();
        let mut report = DiscoveryReport {
            found: scanned.iter().map(|(_, games)| games.len()).sum(),
            ..Default::default()
        };

        self.state
            .set_progress(SCAN_DONE, format!("Found {} executables", report.found));

        for (index, (launcher, games)) in scanned.iter().enumerate() {
            let band = LAUNCHER_BANDS
                .get(index)
                .copied()
                .unwrap_or((FINALIZE, FINALIZE));

            for (done, game) in games.iter().enumerate() {
                self.state.set_progress(
                    phase_progress(band, done, games.len()),
                    format!("Adding {} game: {}", launcher, game.name),
                );
                self.apply_discovered(game, marking, &mut report).await;
            }
            self.state.set_progress(band.1, format!("Finished {} games", launcher));
        }

        self.state.set_progress(FINALIZE, "Saving settings...");
        if !report.added.is_empty() {
            self.persist();
        }

        tracing::info!(
            "Auto-detection complete: {} found, {} added, {} failed, {} skipped",
            report.found,
            report.added.len(),
            report.failed.len(),
            report.skipped
        );

        self.state
            .finish_discovery(report.added.len(), report.failed.len());
        self.state.worker_finished();
        report
    }

    async fn apply_discovered(
        &self,
        game: &GameExecutable,
        marking: DscpValue,
        report: &mut DiscoveryReport,
    ) {
        if let Err(e) = validate_game_name(&game.name) {
            tracing::warn!("Not adding {}: {}", game.path, e);
            self.record_apply(&game.name, marking, false);
            report.failed.push(game.name.clone());
            return;
        }

        let _guard = self.locks.acquire(&game.name).await;

        if !game.path.exists() {
            tracing::debug!("Skipping {}: {} no longer exists", game.name, game.path);
            self.metrics.record_game_skipped();
            report.skipped += 1;
            return;
        }

        let applied = self
            .store
            .create_or_replace(&game.name, game.path.as_str(), marking)
            .await;

        let recorded = applied && {
            let result = self.registry().set_value(&game.name, marking);
            if let Err(e) = &result {
                tracing::warn!("Not recording {}: {}", game.name, e);
            }
            result.is_ok()
        };

        self.record_apply(&game.name, marking, recorded);
        if recorded {
            report.added.push(game.name.clone());
        } else {
            report.failed.push(game.name.clone());
        }
    }

    fn record_apply(&self, name: &str, marking: DscpValue, success: bool) {
        if success {
            self.metrics.record_policy_applied();
        } else {
            self.metrics.record_policy_failed();
        }
        self.state.emit(StateChange::PolicyApplied {
            name: name.to_string(),
            marking: marking.get(),
            success,
        });
    }

    /// Create a policy for a manually chosen executable.
    ///
    /// # Returns
    /// `Ok(true)` when the policy is active and recorded, `Ok(false)` when the
    /// store failed, `Err` when an argument is invalid (nothing is touched)
    pub async fn add_game(
        &self,
        name: &str,
        app_path: &str,
        marking: i64,
    ) -> Result<bool, ValidationError> {
        validate_game_name(name)?;
        if !app_path.to_ascii_lowercase().ends_with(".exe") {
            return Err(ValidationError::NotAnExecutable(app_path.to_string()));
        }
        let marking = DscpValue::new(marking)?;

        let _guard = self.locks.acquire(name).await;
        self.state.worker_started();
        self.state.set_operation(format!("Adding {}", name));

        let applied = self.store.create_or_replace(name, app_path, marking).await;
        let recorded = applied && self.record_marking(name, marking);

        self.record_apply(name, marking, recorded);
        self.state.worker_finished();
        Ok(recorded)
    }

    /// Change the marking of an existing policy.
    ///
    /// The registry is committed before the store is updated; when the store
    /// then fails the two disagree until the next successful edit.
    pub async fn edit(&self, name: &str, marking: i64) -> Result<bool, ValidationError> {
        let marking = DscpValue::new(marking)?;
        validate_game_name(name)?;

        let _guard = self.locks.acquire(name).await;
        self.state.worker_started();
        self.state
            .set_operation(format!("Updating {} to DSCP {}", name, marking));

        let app_path = self
            .store
            .list_all()
            .await
            .into_iter()
            .find(|record| record.name == name)
            .map(|record| record.app_path);

        let applied = match app_path {
            Some(app_path) => {
                self.record_marking(name, marking);
                self.store.create_or_replace(name, &app_path, marking).await
            }
            None => {
                tracing::error!("Cannot edit {}: no such policy", name);
                self.error_log
                    .append(&format!("Cannot edit {}: no such policy", name));
                false
            }
        };

        self.record_apply(name, marking, applied);
        self.state.worker_finished();
        Ok(applied)
    }

    /// Delete a policy and forget its marking.
    ///
    /// The registry entry goes even when the store refuses the delete.
    pub async fn remove(&self, name: &str) -> bool {
        let _guard = self.locks.acquire(name).await;
        self.remove_locked(name).await
    }

    async fn remove_locked(&self, name: &str) -> bool {
        let removed = self.store.remove(name).await;
        if removed {
            self.metrics.record_policy_removed();
        }

        let had_entry = self.registry().remove(name).is_some();
        if had_entry {
            self.persist();
        }

        self.state.emit(StateChange::PolicyRemoved {
            name: name.to_string(),
            success: removed,
        });
        removed
    }

    /// Delete every policy the store reports and reset the registry to `DEFAULT`.
    ///
    /// # Returns
    /// How many policies the store confirmed deleting
    pub async fn remove_all(&self) -> usize {
        self.state.worker_started();
        self.state.set_operation("Removing all QoS policies...");

        let records = self.store.list_all().await;
        let mut removed = 0;
        for record in &records {
            let _guard = self.locks.acquire(&record.name).await;
            if self.store.remove(&record.name).await {
                self.metrics.record_policy_removed();
                removed += 1;
            }
        }

        self.registry().reset_to_default();
        self.persist();
        self.state.emit(StateChange::RegistryReset);

        tracing::info!("Removed {} of {} policies", removed, records.len());
        self.state.worker_finished();
        removed
    }

    /// Change the marking future discoveries use. Existing entries are untouched.
    pub fn set_default(&self, value: i64) -> Result<(), ValidationError> {
        let value = DscpValue::new(value)?;
        self.registry().set_default(value);
        self.persist();
        self.state.set_default_marking(value.get());
        tracing::info!("Default DSCP set to {}", value);
        Ok(())
    }

    /// Store listing joined with the recorded markings.
    pub async fn games(&self) -> Vec<GameEntry> {
        let records = self.store.list_all().await;
        let registry = self.registry();
        records
            .into_iter()
            .map(|record| GameEntry {
                marking: registry.get(&record.name),
                name: record.name,
                app_path: record.app_path,
            })
            .collect()
    }
}
