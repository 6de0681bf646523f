//! Services module - discovery of installed games and access to the OS policy store.
//!
//! Nothing here knows about the registry or about progress reporting; the
//! [`engine`](crate::engine) combines these pieces.
//!
//! # Components
//!
//! - [`library_scanner`]: partition enumeration, install-root probing, the
//!   executable denylist and the [`GameLibrary`] trait
//! - [`EpicLibrary`]: recursive walk of `Epic Games` folders
//! - [`SteamLibrary`]: `libraryfolders.vdf` driven, one level under `steamapps/common`
//! - [`PolicyStoreAdapter`]: create/replace, remove and list QoS policies through a
//!   [`CommandRunner`] (PowerShell in production)
//! - [`policy_table`]: parser for the store's tabular listing
//!
//! # Usage Example
//!
//! ```ignore
//! use qosmgr::services::{EpicLibrary, GameLibrary, ScanContext, SteamLibrary};
//!
//! let context = ScanContext::from_settings(&settings.scan);
//! for library in [
//!     Box::new(EpicLibrary::new(context.clone())) as Box<dyn GameLibrary>,
//!     Box::new(SteamLibrary::new(context)),
//! ] {
//!     if let Some(games) = library.scan() {
//!         println!("{}: {} executables", library.launcher(), games.len());
//!     }
//! }
//! ```

pub mod epic_library;
pub mod library_scanner;
pub mod policy_store;
pub mod policy_table;
pub mod steam_library;

pub use epic_library::EpicLibrary;
pub use library_scanner::{Denylist, GameLibrary, ScanContext};
pub use policy_store::{
    CommandError, CommandOutput, CommandRunner, PolicyStoreAdapter, PowerShellRunner,
};
pub use policy_table::parse_policy_table;
pub use steam_library::SteamLibrary;
