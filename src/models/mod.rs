//! Data models for qosmgr.
//!
//! - [`AppState`]: observable worker state (progress, current operation)
//! - [`Settings`]: paths, shell invocation and scan options loaded from `qosmgr.yaml`
//! - [`GameExecutable`], [`PolicyRecord`], [`GameEntry`]: what scans produce and the store reports
//! - [`DscpValue`]: a marking value that is valid by construction

pub mod app_state;
pub mod config;
pub mod game;
pub mod marking;

pub use app_state::AppState;
pub use self::config::{PathSettings, ScanSettings, Settings, StoreSettings, default_denylist};
pub use game::{GameEntry, GameExecutable, Launcher, PolicyRecord};
pub use marking::{DscpValue, FALLBACK_DEFAULT_DSCP, MAX_DSCP, ValidationError, validate_game_name};
