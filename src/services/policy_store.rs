use crate::logging::ErrorLog;
use crate::metrics::Metrics;
use crate::models::{DscpValue, PolicyRecord, StoreSettings};
use crate::services::policy_table::parse_policy_table;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors that can occur while talking to the policy store
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Command exited with code {exit_code}: {stderr}")]
    UnexpectedExit { exit_code: i32, stderr: String },

    #[error("Policy {0} was not found after creation")]
    VerificationFailed(String),
}

/// Executes one script against the policy store's shell.
///
/// This is the seam between reconciliation logic and the operating system;
/// tests substitute mocks or an in-memory store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, script: &str) -> Result<CommandOutput, CommandError>;
}

/// Runs scripts through PowerShell (`powershell.exe -NoProfile -Command <script>`)
#[derive(Debug, Clone)]
pub struct PowerShellRunner {
    shell: String,
    shell_args: Vec<String>,
    command_timeout: Option<Duration>,
}

impl PowerShellRunner {
    pub fn new(settings: &StoreSettings) -> Self {
        Self {
            shell: settings.shell.clone(),
            shell_args: settings.shell_args.clone(),
            command_timeout: settings.command_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[async_trait]
impl CommandRunner for PowerShellRunner {
    async fn run(&self, script: &str) -> Result<CommandOutput, CommandError> {
        tracing::debug!("Executing: {} {:?} {}", self.shell, self.shell_args, script);

        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;

        // No timeout configured means the worker waits as long as the shell does
        let output = match self.command_timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    tracing::warn!("Policy command timed out after {:?}", limit);
                    CommandError::Timeout(limit)
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Single-quote a value for PowerShell; embedded quotes are doubled.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The store matches backslash-separated application paths.
pub fn normalize_app_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Delete-if-exists (errors suppressed) followed by create.
pub fn create_script(name: &str, app_path: &str, marking: DscpValue) -> String {
    format!(
        "Remove-NetQosPolicy -Name {name} -Confirm:$false -ErrorAction SilentlyContinue; \
         New-NetQosPolicy -Name {name} -AppPathNameMatchCondition {path} -IPProtocol Both -DSCPAction {marking}",
        name = quote(name),
        path = quote(&normalize_app_path(app_path)),
        marking = marking,
    )
}

pub fn query_script(name: &str) -> String {
    format!("Get-NetQosPolicy -Name {} | Format-List", quote(name))
}

pub fn list_script() -> String {
    "Get-NetQosPolicy | Format-Table Name, AppPathNameMatchCondition -AutoSize | Out-String -Width 4096"
        .to_string()
}

pub fn delete_script(name: &str) -> String {
    format!("Remove-NetQosPolicy -Name {} -Confirm:$false", quote(name))
}

/// Creates, queries and deletes QoS policies through a [`CommandRunner`].
///
/// No operation ever returns an error: every failure is traced, appended to the
/// error log and reported as `false` or an empty listing.
pub struct PolicyStoreAdapter<R: CommandRunner> {
    runner: R,
    error_log: Arc<ErrorLog>,
    metrics: Arc<Metrics>,
}

impl<R: CommandRunner> PolicyStoreAdapter<R> {
    pub fn new(runner: R, error_log: Arc<ErrorLog>, metrics: Arc<Metrics>) -> Self {
        Self {
            runner,
            error_log,
            metrics,
        }
    }

    async fn execute(&self, script: &str) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();
        let result = self.runner.run(script).await;
        self.metrics.record_command(start.elapsed(), result.is_ok());
        result
    }

    fn report_failure(&self, operation: &str, error: &CommandError) {
        tracing::error!("{} failed: {}", operation, error);
        self.error_log.append(&format!("{} failed: {}", operation, error));
    }

    /// Replace any policy named `name` with one matching `app_path` and marking it
    /// with `marking`, then confirm the store knows the name.
    pub async fn create_or_replace(&self, name: &str, app_path: &str, marking: DscpValue) -> bool {
        let operation = format!("Setting QoS policy {}", name);

        match self.execute(&create_script(name, app_path, marking)).await {
            Ok(output) => {
                if !output.stderr.trim().is_empty() {
                    tracing::warn!("New-NetQosPolicy reported for {}: {}", name, output.stderr.trim());
                }
            }
            Err(e) => {
                self.report_failure(&operation, &e);
                return false;
            }
        }

        // The create command can fail silently on malformed input; trust only a fresh query
        match self.execute(&query_script(name)).await {
            Ok(output) if output.stdout.contains(name) => {
                tracing::info!("Policy {} active with DSCP {}", name, marking);
                true
            }
            Ok(_) => {
                self.report_failure(&operation, &CommandError::VerificationFailed(name.to_string()));
                false
            }
            Err(e) => {
                self.report_failure(&operation, &e);
                false
            }
        }
    }

    /// Delete the policy named `name`. True iff the store reports success.
    pub async fn remove(&self, name: &str) -> bool {
        let operation = format!("Removing QoS policy {}", name);

        match self.execute(&delete_script(name)).await {
            Ok(output) if output.success() => {
                tracing::info!("Policy {} removed", name);
                true
            }
            Ok(output) => {
                self.report_failure(
                    &operation,
                    &CommandError::UnexpectedExit {
                        exit_code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    },
                );
                false
            }
            Err(e) => {
                self.report_failure(&operation, &e);
                false
            }
        }
    }

    /// Every policy in the store, in store order.
    pub async fn list_all(&self) -> Vec<PolicyRecord> {
        let operation = "Listing QoS policies";

        match self.execute(&list_script()).await {
            Ok(output) if output.success() => {
                let records = parse_policy_table(&output.stdout);
                tracing::debug!("Store reports {} policies", records.len());
                records
            }
            Ok(output) => {
                self.report_failure(
                    operation,
                    &CommandError::UnexpectedExit {
                        exit_code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    },
                );
                Vec::new()
            }
            Err(e) => {
                self.report_failure(operation, &e);
                Vec::new()
            }
        }
    }
}
