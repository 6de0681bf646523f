//! Shared fixtures for integration tests.
//!
//! - [`FakeQosStore`]: in-memory policy store answering the PowerShell scripts
//!   the adapter sends
//! - [`FakeDrive`]: a temporary partition with Steam and Epic layouts
//! - [`TestEnv`]: an engine wired to both

#![allow(dead_code)]

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use qosmgr::engine::ReconciliationEngine;
use qosmgr::logging::ErrorLog;
use qosmgr::metrics::Metrics;
use qosmgr::registry::DscpRegistry;
use qosmgr::services::{
    CommandError, CommandOutput, CommandRunner, Denylist, EpicLibrary, GameLibrary,
    PolicyStoreAdapter, ScanContext, SteamLibrary,
};
use qosmgr::StateManager;
use qosmgr::models::default_denylist;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakePolicy {
    pub app_path: String,
    pub dscp: u8,
}

#[derive(Default)]
struct FakeState {
    policies: IndexMap<String, FakePolicy>,
    refuse: HashSet<String>,
    scripts: Vec<String>,
}

/// In-memory stand-in for the Windows QoS policy store.
///
/// Clones share the same policies, so a test can keep one handle while the
/// adapter owns another.
#[derive(Clone)]
pub struct FakeQosStore {
    state: Arc<Mutex<FakeState>>,
    latency: Duration,
    quoted: Arc<Regex>,
    dscp: Arc<Regex>,
}

impl FakeQosStore {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Every command sleeps for `latency` first, widening race windows.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            latency,
            quoted: Arc::new(Regex::new(r"'((?:[^']|'')*)'").unwrap()),
            dscp: Arc::new(Regex::new(r"-DSCPAction (\d+)").unwrap()),
        }
    }

    /// Make creates for `name` fail silently, like a rejected New-NetQosPolicy.
    pub fn refuse(&self, name: &str) {
        self.state.lock().unwrap().refuse.insert(name.to_string());
    }

    pub fn insert(&self, name: &str, app_path: &str, dscp: u8) {
        self.state.lock().unwrap().policies.insert(
            name.to_string(),
            FakePolicy {
                app_path: app_path.to_string(),
                dscp,
            },
        );
    }

    pub fn policy(&self, name: &str) -> Option<FakePolicy> {
        self.state.lock().unwrap().policies.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().policies.keys().cloned().collect()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    fn quoted_args(&self, script: &str) -> Vec<String> {
        self.quoted
            .captures_iter(script)
            .map(|caps| caps[1].replace("''", "'"))
            .collect()
    }

    fn answer(&self, script: &str) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(script.to_string());
        let args = self.quoted_args(script);

        if script.contains("New-NetQosPolicy") {
            let name = args[0].clone();
            state.policies.shift_remove(&name);
            if state.refuse.contains(&name) {
                return failure("New-NetQosPolicy : Invalid parameter");
            }
            let dscp = self.dscp.captures(script).unwrap()[1].parse().unwrap();
            state.policies.insert(
                name,
                FakePolicy {
                    app_path: args[2].clone(),
                    dscp,
                },
            );
            return success(String::new());
        }

        if script.starts_with("Get-NetQosPolicy -Name") {
            return match state.policies.get(&args[0]) {
                Some(policy) => success(format!(
                    "\r\nName                           : {}\r\nAppPathName                    : {}\r\nDSCPValue                      : {}\r\n\r\n",
                    args[0], policy.app_path, policy.dscp
                )),
                None => failure(&format!(
                    "No MSFT_NetQosPolicySettingData objects found with property 'Name' equal to '{}'",
                    args[0]
                )),
            };
        }

        if script.starts_with("Get-NetQosPolicy |") {
            let mut table = String::from("\r\nName AppPathNameMatchCondition\r\n---- -------------------------\r\n");
            for (name, policy) in &state.policies {
                table.push_str(&format!("{}   {}\r\n", name, policy.app_path));
            }
            table.push_str("\r\n\r\n");
            return success(table);
        }

        if script.starts_with("Remove-NetQosPolicy") {
            return match state.policies.shift_remove(&args[0]) {
                Some(_) => success(String::new()),
                None => failure("No matching MSFT_NetQosPolicySettingData objects found"),
            };
        }

        panic!("Unexpected script: {}", script);
    }
}

fn success(stdout: String) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout,
        stderr: String::new(),
    }
}

fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl CommandRunner for FakeQosStore {
    async fn run(&self, script: &str) -> Result<CommandOutput, CommandError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.answer(script))
    }
}

/// A temporary partition root.
pub struct FakeDrive {
    _temp_dir: TempDir,
    pub root: Utf8PathBuf,
}

impl FakeDrive {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    pub fn touch(&self, relative: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"MZ").unwrap();
        path
    }

    /// Launcher binary under `Program Files (x86)`, the vendor default.
    pub fn install_epic_launcher(&self) {
        self.touch("Program Files (x86)/Epic Games/Launcher/Engine/Binaries/Win64/EpicGamesLauncher.exe");
    }

    /// `relative_exe` below `Program Files/Epic Games/<folder>`.
    pub fn add_epic_game(&self, folder: &str, relative_exe: &str) -> Utf8PathBuf {
        self.touch(&format!("Program Files/Epic Games/{}/{}", folder, relative_exe))
    }

    /// Steam under `Program Files (x86)/Steam` with the given library folders.
    pub fn install_steam(&self, libraries: &[&Utf8Path]) -> Utf8PathBuf {
        let steam_root = self.root.join("Program Files (x86)").join("Steam");
        self.touch("Program Files (x86)/Steam/steam.exe");

        let mut manifest = String::from("\"libraryfolders\"\n{\n");
        for (index, library) in libraries.iter().enumerate() {
            let escaped = library.as_str().replace('\\', "\\\\");
            manifest.push_str(&format!(
                "\t\"{}\"\n\t{{\n\t\t\"path\"\t\t\"{}\"\n\t\t\"label\"\t\t\"\"\n\t}}\n",
                index, escaped
            ));
        }
        manifest.push_str("}\n");

        fs::create_dir_all(steam_root.join("steamapps")).unwrap();
        fs::write(steam_root.join("steamapps").join("libraryfolders.vdf"), manifest).unwrap();
        steam_root
    }

    /// `exe` directly inside `<library>/steamapps/common/<folder>`.
    pub fn add_steam_game(library: &Utf8Path, folder: &str, exe: &str) -> Utf8PathBuf {
        let path = library.join("steamapps").join("common").join(folder).join(exe);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"MZ").unwrap();
        path
    }

    pub fn scan_context(&self) -> Arc<ScanContext> {
        Arc::new(ScanContext::new(
            vec![self.root.clone()],
            Denylist::new(default_denylist()),
        ))
    }

    pub fn libraries(&self) -> Vec<Box<dyn GameLibrary>> {
        let context = self.scan_context();
        vec![
            Box::new(EpicLibrary::new(Arc::clone(&context))),
            Box::new(SteamLibrary::new(context)),
        ]
    }
}

/// Engine over a fake drive and a fake store, persisting into its own directory.
pub struct TestEnv {
    pub drive: FakeDrive,
    pub store: FakeQosStore,
    pub engine: Arc<ReconciliationEngine<FakeQosStore>>,
    pub metrics: Arc<Metrics>,
    pub registry_path: Utf8PathBuf,
    pub error_log_path: Utf8PathBuf,
    _data_dir: TempDir,
}

impl TestEnv {
    pub fn new(drive: FakeDrive, store: FakeQosStore) -> Self {
        Self::with_registry(drive, store, None)
    }

    /// Start from a registry file holding `contents`.
    pub fn with_registry(drive: FakeDrive, store: FakeQosStore, contents: Option<&str>) -> Self {
        let data_dir = TempDir::new().unwrap();
        let data_path = Utf8PathBuf::try_from(data_dir.path().to_path_buf()).unwrap();
        let registry_path = data_path.join("dscp_settings.txt");
        let error_log_path = data_path.join("Errors.txt");

        if let Some(contents) = contents {
            fs::write(&registry_path, contents).unwrap();
        }

        let error_log = Arc::new(ErrorLog::new(&error_log_path));
        let metrics = Arc::new(Metrics::new());
        let adapter = PolicyStoreAdapter::new(store.clone(), Arc::clone(&error_log), Arc::clone(&metrics));

        let engine = Arc::new(ReconciliationEngine::new(
            adapter,
            DscpRegistry::open(&registry_path).unwrap(),
            drive.libraries(),
            StateManager::new(),
            error_log,
            Arc::clone(&metrics),
        ));

        Self {
            drive,
            store,
            engine,
            metrics,
            registry_path,
            error_log_path,
            _data_dir: data_dir,
        }
    }

    /// Registry as it is on disk right now.
    pub fn persisted(&self) -> DscpRegistry {
        DscpRegistry::open(&self.registry_path).unwrap()
    }

    pub fn registry_file(&self) -> String {
        fs::read_to_string(&self.registry_path).unwrap_or_default()
    }

    pub fn error_log(&self) -> String {
        fs::read_to_string(&self.error_log_path).unwrap_or_default()
    }
}
