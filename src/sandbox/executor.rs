use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{ExecResult, ResourceLimits};

/// Trait for different sandbox execution implementations
///
/// This trait abstracts the single operation needed to run an untrusted
/// program text - from basic rlimit containment on the host to full container
/// isolation. Both implementations must honor the same contract so callers
/// can swap them without code change.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    /// Runs `program` as a single child process and reports the outcome
    ///
    /// The program is written to a fresh, auto-cleaned scratch directory and
    /// executed with a minimal fixed environment, the configured resource
    /// caps, and a wall-clock timeout independent of the CPU budget. Stdout
    /// and stderr are captured fully and separately.
    ///
    /// Anticipated failures (non-zero exit, signal death, timeout, missing
    /// runtime) are returned as `ExecResult` values with a classification
    /// tag; only unexpected host-level failures propagate as errors.
    async fn execute(
        &self,
        program: &str,
        timeout: Duration,
        limits: &ResourceLimits,
    ) -> Result<ExecResult>;
}
