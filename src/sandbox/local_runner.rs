use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use super::{ExecResult, ResourceLimits, SandboxExecutor, classify_exit, resolve_binary};

// Containment limits not exposed through ResourceLimits
const MAX_OPEN_FILES: u64 = 256;
const MAX_PROCESSES: u64 = 64;

/// Interpreter flags: isolated mode, no .pyc files, no site imports
const PYTHON_FLAGS: [&str; 3] = ["-I", "-B", "-S"];

/// An executor that runs candidate programs as rlimit-contained host processes
///
/// LocalExecutor caps CPU time, address space, file size, open files and
/// process count through POSIX rlimits, and enforces an independent
/// wall-clock timeout. It provides no network denial or filesystem jailing;
/// use DockerExecutor where stronger isolation is required.
pub struct LocalExecutor {
    /// Absolute path to the python interpreter, if one was found
    python: Option<PathBuf>,
}

impl LocalExecutor {
    pub fn build() -> Result<Self> {
        let python = resolve_binary("python3");

        match &python {
            Some(path) => log::info!("LocalExecutor initialized with {}", path.display()),
            None => log::warn!("LocalExecutor could not locate python3 on PATH"),
        }
        log::warn!("LocalExecutor provides rlimit containment only, not full isolation");

        Ok(Self { python })
    }
}

#[async_trait]
impl SandboxExecutor for LocalExecutor {
    async fn execute(
        &self,
        program: &str,
        wall_timeout: Duration,
        limits: &ResourceLimits,
    ) -> Result<ExecResult> {
        let start = Instant::now();

        let Some(python) = &self.python else {
            return Ok(ExecResult {
                ok: false,
                stdout: String::new(),
                stderr: String::new(),
                exception: Some("runtime_not_found".to_string()),
                time_s: start.elapsed().as_secs_f64(),
            });
        };

        // Fresh scratch directory per call, removed on drop
        let scratch = tempfile::Builder::new()
            .prefix("sandbox_")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let source_path = scratch.path().join("main.py");
        std::fs::write(&source_path, format!("{program}\n"))
            .context("Failed to write program to scratch directory")?;

        let cpu_seconds = limits.cpu_seconds.unwrap_or(wall_timeout.as_secs()).max(1);
        let mem_bytes = limits.memory_mb * 1024 * 1024;
        let file_bytes = limits.file_size_mb * 1024 * 1024;

        let mut cmd = tokio::process::Command::new(python);
        cmd.args(PYTHON_FLAGS)
            .arg("main.py")
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Minimal fixed environment: no inherited credentials or proxy
        // variables, deterministic hashing and text encoding
        cmd.env_clear()
            .env("PATH", "/usr/bin:/bin")
            .env("PYTHONHASHSEED", "0")
            .env("PYTHONIOENCODING", "UTF-8")
            .env("PYTHONNOUSERSITE", "1");

        unsafe {
            cmd.pre_exec(move || {
                apply_rlimits(cpu_seconds, mem_bytes, file_bytes);
                Ok(())
            });
        }

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

        // Drain both pipes concurrently so a chatty child cannot deadlock on
        // a full pipe buffer, and partial output survives a timeout kill
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
            Ok(status) => classify_exit(status.context("Failed to wait for child process")?),
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    log::error!("Failed to kill timed-out child: {e}");
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

/// Sets rlimits on the child between fork and exec
///
/// Failures are ignored rather than fatal: a missing limit degrades
/// containment but the wall-clock timeout still bounds the run. Only
/// async-signal-safe calls are allowed here.
fn apply_rlimits(cpu_seconds: u64, mem_bytes: u64, file_bytes: u64) {
    let lim = |v: u64| libc::rlimit {
        rlim_cur: v as libc::rlim_t,
        rlim_max: v as libc::rlim_t,
    };

    unsafe {
        let _ = libc::setrlimit(libc::RLIMIT_CPU, &lim(cpu_seconds));
        let _ = libc::setrlimit(libc::RLIMIT_AS, &lim(mem_bytes));
        let _ = libc::setrlimit(libc::RLIMIT_FSIZE, &lim(file_bytes));
        let _ = libc::setrlimit(libc::RLIMIT_NOFILE, &lim(MAX_OPEN_FILES));
        let _ = libc::setrlimit(libc::RLIMIT_NPROC, &lim(MAX_PROCESSES));
        let _ = libc::setrlimit(libc::RLIMIT_CORE, &lim(0));
    }
}
