/// Observable state of the reconciliation workers.
///
/// This is what a front end renders: coarse progress of the running discovery,
/// the operation currently described to the user and the outcome of the last
/// discovery run. The DSCP mapping itself is owned by the engine's registry,
/// not mirrored here.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Mutate it only through [`StateManager::update`](crate::state::StateManager::update)
/// so that change events are emitted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    // Runtime state
    pub is_discovering: bool,
    pub current_operation: String,
    pub active_workers: usize,

    // Advisory progress of auto-discovery, 0..=100
    pub progress: u8,

    // Results of the last discovery run
    pub last_added: usize,
    pub last_failed: usize,

    // Mirrors the registry's DEFAULT entry for display
    pub default_marking: u8,
}

impl AppState {
    /// Reset everything tied to a discovery run.
    pub fn reset_discovery(&mut self) {
        self.is_discovering = false;
        self.progress = 0;
        self.last_added = 0;
        self.last_failed = 0;
        self.current_operation.clear();
    }
}
