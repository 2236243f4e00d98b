use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::sandbox::{DEFAULT_TIMEOUT_S, Isolation, ResourceLimits};
use crate::verifier::{TestCase, TestSuite};

#[derive(Parser)]
#[command(name = "veripy", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the candidate source file
    #[arg(long = "code", short = 'c')]
    pub code_path: PathBuf,

    /// Name of the candidate function under test
    #[arg(long = "function", short = 'f')]
    pub function_name: String,

    /// Path to a JSON list of structured test cases
    #[arg(long = "tests", short = 't', conflicts_with = "snippet_path")]
    pub tests_path: Option<PathBuf>,

    /// Path to a free-form test snippet defining check(candidate)
    #[arg(long = "snippet", short = 's')]
    pub snippet_path: Option<PathBuf>,

    /// Wall-clock timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_S)]
    pub timeout: u64,

    /// CPU-time budget in seconds (defaults to the wall timeout)
    #[arg(long)]
    pub cpu_seconds: Option<u64>,

    /// Memory cap in megabytes
    #[arg(long, default_value_t = 256)]
    pub memory_mb: u64,

    /// File-size cap in megabytes
    #[arg(long, default_value_t = 16)]
    pub file_size_mb: u64,

    /// CPU core fraction (container isolation only)
    #[arg(long, default_value_t = 1.0)]
    pub cpus: f64,

    /// Run the candidate inside a docker container instead of an
    /// rlimit-contained host process
    #[arg(long, default_value_t = false)]
    pub docker: bool,

    /// Container image to run (container isolation only)
    #[arg(long)]
    pub image: Option<String>,
}

impl CliArgs {
    pub fn isolation(&self) -> Isolation {
        if self.docker {
            Isolation::Docker
        } else {
            Isolation::Local
        }
    }

    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu_seconds: self.cpu_seconds,
            memory_mb: self.memory_mb,
            file_size_mb: self.file_size_mb,
            cpus: self.cpus,
        }
    }

    /// Loads the test suite from whichever of --tests/--snippet was given
    pub fn load_suite(&self) -> Result<TestSuite> {
        match (&self.tests_path, &self.snippet_path) {
            (Some(path), None) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open test file {}", path.display()))?;
                let reader = std::io::BufReader::new(file);
                let cases: Vec<TestCase> = serde_json::from_reader(reader)
                    .with_context(|| format!("Invalid test case JSON in {}", path.display()))?;
                Ok(TestSuite::Cases(cases))
            }
            (None, Some(path)) => {
                let snippet = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read snippet {}", path.display()))?;
                Ok(TestSuite::Snippet(snippet))
            }
            _ => bail!("Exactly one of --tests or --snippet must be given"),
        }
    }
}
