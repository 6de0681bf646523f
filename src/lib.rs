// qosmgr - per-game network QoS (DSCP) policy manager
//
// This is the library crate containing discovery, the DSCP registry, the policy
// store adapter and the reconciliation engine. The binary crate (main.rs)
// provides the command-line entry point.

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use crate::config::ConfigManager;
pub use engine::{DiscoveryReport, ReconciliationEngine};
pub use models::{AppState, DscpValue, GameEntry, GameExecutable, Launcher, Settings};
pub use registry::DscpRegistry;
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
