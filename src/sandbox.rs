mod docker_runner;
mod executor;
mod local_runner;

// Re-export the trait and common types
use docker_runner::DockerExecutor;
pub use executor::SandboxExecutor;
use local_runner::LocalExecutor;

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use anyhow::Result;
use serde::Deserialize;

/// Result of running one program in a sandbox
///
/// Produced exactly once per execution attempt. Expected failure modes
/// (non-zero exit, signal death, timeout, missing runtime) are reported
/// through the `exception` tag, never as errors.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Process exited with status 0
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    /// Classification tag: "timeout", "signal:<n>", "returncode:<n>",
    /// "runtime_not_found", "exception:<kind>"
    pub exception: Option<String>,
    /// Wall-clock duration of the run in seconds
    pub time_s: f64,
}

/// Resource caps enforced on the sandboxed child process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// CPU-time budget in seconds; defaults to the wall timeout if unset
    pub cpu_seconds: Option<u64>,
    /// Address-space cap in megabytes
    pub memory_mb: u64,
    /// Max size of any file the child creates, in megabytes
    pub file_size_mb: u64,
    /// CPU core fraction (container variant only)
    pub cpus: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_seconds: None,
            memory_mb: 256,
            file_size_mb: 16,
            cpus: 1.0,
        }
    }
}

/// Default wall-clock timeout in seconds
pub const DEFAULT_TIMEOUT_S: u64 = 2;

/// How the candidate program is isolated from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Child process on the host with POSIX rlimits
    Local,
    /// Network-disabled, read-only, capability-dropped container
    Docker,
}

/// Creates a sandbox executor for the requested isolation level
///
/// Both executors expose the identical `execute` contract, so callers can
/// swap them without code change. The docker variant takes the image to run;
/// `None` selects the default image.
pub fn create_executor(
    isolation: Isolation,
    image: Option<String>,
) -> Result<Box<dyn SandboxExecutor>> {
    match isolation {
        Isolation::Local => {
            log::info!("Creating LocalExecutor (rlimit containment mode)");
            let executor = LocalExecutor::build()?;
            Ok(Box::new(executor))
        }
        Isolation::Docker => {
            log::info!("Creating DockerExecutor (container isolation mode)");
            let executor = DockerExecutor::build(image)?;
            Ok(Box::new(executor))
        }
    }
}

/// Locates a binary on the host via `which`
///
/// Returns `None` when the binary cannot be found; executors report that as
/// a `runtime_not_found` result instead of failing construction.
fn resolve_binary(name: &str) -> Option<std::path::PathBuf> {
    let output = std::process::Command::new("which").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(std::path::PathBuf::from(path))
    }
}

/// Maps an exit status to the classification tag for `ExecResult.exception`
///
/// Exit 0 yields `None`. Signal death (commonly the CPU or memory rlimit
/// firing) yields "signal:<n>", any other exit yields "returncode:<n>".
fn classify_exit(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    match status.code() {
        Some(code) => Some(format!("returncode:{code}")),
        None => Some(format!("signal:{}", status.signal().unwrap_or(0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_documented_values() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.cpu_seconds, None);
        assert_eq!(limits.memory_mb, 256);
        assert_eq!(limits.file_size_mb, 16);
        assert_eq!(limits.cpus, 1.0);
    }

    #[test]
    fn limits_deserialize_with_partial_fields() {
        let limits: ResourceLimits = serde_json::from_str(r#"{"memory_mb": 512}"#).unwrap();
        assert_eq!(limits.memory_mb, 512);
        assert_eq!(limits.file_size_mb, 16);
    }

    #[test]
    fn classify_exit_handles_success_and_failure() {
        let ok = std::process::Command::new("true").status().unwrap();
        assert_eq!(classify_exit(ok), None);

        let bad = std::process::Command::new("false").status().unwrap();
        assert_eq!(classify_exit(bad), Some("returncode:1".to_string()));
    }
}
