use serde::{Deserialize, Serialize};

/// Application settings from `qosmgr.yaml`
///
/// Every section falls back to its defaults, so an empty or missing file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub store: StoreSettings,
    pub scan: ScanSettings,
    pub debug_mode: bool,
}

/// Where persisted state and logs live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub registry_file: String,
    pub error_log_file: String,
    pub log_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            registry_file: "dscp_settings.txt".to_string(),
            error_log_file: "Errors.txt".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

/// How the policy store is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub shell: String,
    pub shell_args: Vec<String>,

    /// Unset means commands may run indefinitely.
    pub command_timeout_secs: Option<u64>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            shell: "powershell.exe".to_string(),
            shell_args: vec!["-NoProfile".to_string(), "-Command".to_string()],
            command_timeout_secs: None,
        }
    }
}

/// Library scanning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Volume roots to probe. Empty means ask the OS.
    pub partitions: Vec<String>,

    /// File-name substrings marking installers, helpers, services and anticheat binaries.
    pub denylist: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            denylist: default_denylist(),
        }
    }
}

/// Markers of auxiliary executables that never get a policy (case-sensitive).
pub fn default_denylist() -> Vec<String> {
    [
        "Trial",
        "trial",
        "installer",
        "Installer",
        "Service",
        "EAAntiCheat",
        "bootstrapper",
        "ReportCodBug",
        "GameServiceLauncher",
        "Handler",
        "cleaner",
        "prep",
        "bootstrapperCrashHandler.exe",
        "codinstallcleaner",
        "launcher",
        "report",
        "Report",
        "Launcher",
        "Helper",
        "DXSETUP",
        "vcredist",
        "Rockstar",
        "Social-Club",
        "AntiCheat",
        "Epic",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
