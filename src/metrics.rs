// Reconciliation metrics
//
// Counters collected while policies are discovered, applied and removed

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide reconciliation metrics.
///
/// Atomic counters so store adapters and discovery workers can record without
/// sharing a lock. Summarized on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Policies created and confirmed by the store
    pub policies_applied: AtomicUsize,

    /// Policies the store failed to create or confirm
    pub policies_failed: AtomicUsize,

    /// Policies deleted from the store
    pub policies_removed: AtomicUsize,

    /// Discovered executables whose path vanished before they were applied
    pub games_skipped: AtomicUsize,

    /// Shell commands that ran to completion
    pub commands_executed: AtomicU64,

    /// Shell commands that failed to launch or timed out
    pub commands_failed: AtomicU64,

    /// Time spent waiting on the shell, in milliseconds
    pub total_command_time_ms: AtomicU64,

    /// Registry writes to disk
    pub registry_saves: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            policies_applied: AtomicUsize::new(0),
            policies_failed: AtomicUsize::new(0),
            policies_removed: AtomicUsize::new(0),
            games_skipped: AtomicUsize::new(0),
            commands_executed: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            total_command_time_ms: AtomicU64::new(0),
            registry_saves: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_policy_applied(&self) {
        self.policies_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_policy_failed(&self) {
        self.policies_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_policy_removed(&self) {
        self.policies_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_skipped(&self) {
        self.games_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registry_save(&self) {
        self.registry_saves.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one shell invocation and how long it took
    pub fn record_command(&self, duration: Duration, completed: bool) {
        if completed {
            self.commands_executed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_command_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average shell round trip in milliseconds
    pub fn avg_command_time_ms(&self) -> f64 {
        let total = self.total_command_time_ms.load(Ordering::Relaxed);
        let count = self.commands_executed.load(Ordering::Relaxed)
            + self.commands_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Reconciliation Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Policies: {} applied, {} failed, {} removed, {} games skipped",
            self.policies_applied.load(Ordering::Relaxed),
            self.policies_failed.load(Ordering::Relaxed),
            self.policies_removed.load(Ordering::Relaxed),
            self.games_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Commands: {} completed, {} failed (avg: {:.2}ms)",
            self.commands_executed.load(Ordering::Relaxed),
            self.commands_failed.load(Ordering::Relaxed),
            self.avg_command_time_ms()
        );
        tracing::info!(
            "Registry saves: {}",
            self.registry_saves.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
