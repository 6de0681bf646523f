// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events to whoever renders progress.

use crate::models::AppState;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Events posted by one worker are received in the order they were posted.
/// Nothing orders events coming from different workers.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Auto-discovery has started
    DiscoveryStarted,

    /// Auto-discovery has finished
    DiscoveryFinished { added: usize, failed: usize },

    /// Advisory discovery progress, in percent
    ProgressUpdated { progress: u8 },

    /// Current operation description has changed
    OperationChanged { operation: String },

    /// Number of running workers has changed
    WorkersChanged { active: usize },

    /// The DEFAULT marking has changed
    DefaultChanged { value: u8 },

    /// A policy create/replace attempt finished
    PolicyApplied {
        name: String,
        marking: u8,
        success: bool,
    },

    /// A policy delete attempt finished
    PolicyRemoved { name: String, success: bool },

    /// Registry was reset to only its DEFAULT entry
    RegistryReset,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Cloning yields another handle onto the same state and channel.
pub struct StateManager {
    /// The observable state
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.read(|state| state.clone())
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_discovering);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Nobody listening is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Emit an event that does not correspond to a field of [`AppState`]
    pub fn emit(&self, change: StateChange) {
        let _ = self.state_tx.send(change);
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_discovering != new.is_discovering {
            if new.is_discovering {
                changes.push(StateChange::DiscoveryStarted);
            } else {
                changes.push(StateChange::DiscoveryFinished {
                    added: new.last_added,
                    failed: new.last_failed,
                });
            }
        }

        if old.progress != new.progress {
            changes.push(StateChange::ProgressUpdated {
                progress: new.progress,
            });
        }

        if old.current_operation != new.current_operation {
            changes.push(StateChange::OperationChanged {
                operation: new.current_operation.clone(),
            });
        }

        if old.active_workers != new.active_workers {
            changes.push(StateChange::WorkersChanged {
                active: new.active_workers,
            });
        }

        if old.default_marking != new.default_marking {
            changes.push(StateChange::DefaultChanged {
                value: new.default_marking,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Mark the start of an auto-discovery run
    pub fn start_discovery(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_discovery();
            state.is_discovering = true;
            state.current_operation = "Scanning for Steam and Epic Games...".to_string();
        })
    }

    /// Mark the end of an auto-discovery run
    pub fn finish_discovery(&self, added: usize, failed: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.last_added = added;
            state.last_failed = failed;
            state.progress = 100;
            state.is_discovering = false;
            state.current_operation = format!("Auto-detection complete. Added {} games.", added);
        })
    }

    /// Publish advisory progress together with a description
    pub fn set_progress(&self, progress: u8, operation: impl Into<String>) -> Vec<StateChange> {
        let operation = operation.into();
        self.update(|state| {
            state.progress = progress.min(100);
            state.current_operation = operation;
        })
    }

    /// Describe what the current worker is doing
    pub fn set_operation(&self, operation: impl Into<String>) -> Vec<StateChange> {
        let operation = operation.into();
        self.update(|state| state.current_operation = operation)
    }

    pub fn worker_started(&self) -> Vec<StateChange> {
        self.update(|state| state.active_workers += 1)
    }

    pub fn worker_finished(&self) -> Vec<StateChange> {
        self.update(|state| state.active_workers = state.active_workers.saturating_sub(1))
    }

    pub fn set_default_marking(&self, value: u8) -> Vec<StateChange> {
        self.update(|state| state.default_marking = value)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
