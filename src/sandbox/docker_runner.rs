use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use super::{ExecResult, ResourceLimits, SandboxExecutor, classify_exit, resolve_binary};

/// Default image the candidate program runs in
const DEFAULT_IMAGE: &str = "veripy-sandbox";

const PIDS_LIMIT: u32 = 128;
const OPEN_FILES_LIMIT: u32 = 256;

/// An executor that runs candidate programs inside a locked-down container
///
/// The container gets no network, a read-only root filesystem, a size-capped
/// tmpfs, dropped capabilities and a pids limit, with the scratch directory
/// bind-mounted read-only. Stronger isolation than LocalExecutor at the cost
/// of requiring a docker engine on the host.
pub struct DockerExecutor {
    /// Absolute path to the docker binary, if one was found
    docker: Option<PathBuf>,
    image: String,
}

impl DockerExecutor {
    pub fn build(image: Option<String>) -> Result<Self> {
        let docker = resolve_binary("docker");
        let image = image.unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        match &docker {
            Some(path) => {
                log::info!("DockerExecutor initialized with {} ({image})", path.display())
            }
            None => log::warn!("DockerExecutor could not locate docker on PATH"),
        }

        Ok(Self { docker, image })
    }
}

#[async_trait]
impl SandboxExecutor for DockerExecutor {
    async fn execute(
        &self,
        program: &str,
        wall_timeout: Duration,
        limits: &ResourceLimits,
    ) -> Result<ExecResult> {
        let start = Instant::now();

        // Fail fast when the engine is unavailable, without attempting execution
        let Some(docker) = &self.docker else {
            return Ok(ExecResult {
                ok: false,
                stdout: String::new(),
                stderr: String::new(),
                exception: Some("runtime_not_found".to_string()),
                time_s: start.elapsed().as_secs_f64(),
            });
        };

        let scratch = tempfile::Builder::new()
            .prefix("vfy_")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let source_path = scratch.path().join("main.py");
        std::fs::write(&source_path, format!("{program}\n"))
            .context("Failed to write program to scratch directory")?;

        let cpus_arg = limits.cpus.to_string();
        let pids_arg = PIDS_LIMIT.to_string();
        let memory_arg = format!("{}m", limits.memory_mb);
        let ulimit_arg = format!("nofile={OPEN_FILES_LIMIT}:{OPEN_FILES_LIMIT}");
        let tmpfs_arg = format!("/tmp:rw,noexec,nosuid,size={}m", limits.file_size_mb);
        let volume_arg = format!("{}:/work:ro", scratch.path().display());

        let mut cmd = tokio::process::Command::new(docker);
        cmd.args([
            "run",
            "--rm",
            "--network",
            "none",
            "--cpus",
            &cpus_arg,
            "--memory",
            &memory_arg,
            "--pids-limit",
            &pids_arg,
            "--ulimit",
            &ulimit_arg,
            "--read-only",
            "--tmpfs",
            &tmpfs_arg,
            "--cap-drop",
            "ALL",
            "--security-opt",
            "no-new-privileges",
            "-v",
            &volume_arg,
            "-w",
            "/work",
            &self.image,
            "python",
            "-I",
            "-B",
            "-S",
            "/work/main.py",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        // Deterministic environment for the docker client; the container
        // itself only sees what the image defines
        cmd.env_clear()
            .env("PATH", "/usr/bin:/bin")
            .env("PYTHONHASHSEED", "0")
            .env("PYTHONIOENCODING", "UTF-8");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(ExecResult {
                    ok: false,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    exception: Some("exception:spawn".to_string()),
                    time_s: start.elapsed().as_secs_f64(),
                });
            }
        };

        let mut stdout_pipe = child
            .stdout
            .take()
            .context("Child stdout pipe was not captured")?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .context("Child stderr pipe was not captured")?;
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let exception = match timeout(wall_timeout, child.wait()).await {
            Ok(status) => classify_exit(status.context("Failed to wait for docker client")?),
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    log::error!("Failed to kill timed-out docker client: {e}");
                }
                let _ = child.wait().await;
                Some("timeout".to_string())
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await?).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await?).into_owned();

        Ok(ExecResult {
            ok: exception.is_none(),
            stdout,
            stderr,
            exception,
            time_s: start.elapsed().as_secs_f64(),
        })
    }
}
