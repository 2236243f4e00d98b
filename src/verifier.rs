use std::fmt;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::harness::{build_snippet_harness, build_structured_harness};
use crate::parser::parse_marker_summary;
use crate::sandbox::{ExecResult, ResourceLimits, SandboxExecutor};

/// One structured test case: call the candidate with `args`/`kwargs` and
/// require the return value to equal `expected`
///
/// The JSON shape matches what an LLM test generator emits:
/// `{"name": ..., "args": [...], "kwargs": {...}, "expected": ...}`, with
/// every field optional but `args`.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    /// Diagnostic label, surfaced as a comment in the generated harness
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: serde_json::Map<String, Value>,
    #[serde(default)]
    pub expected: Value,
}

/// Test specification accepted by the verifier
#[derive(Debug, Clone)]
pub enum TestSuite {
    /// Free-form snippet defining `check(candidate)`; assertion counts come
    /// from whatever the snippet reports
    Snippet(String),
    /// Structured cases, evaluated in input order; `num_total` always equals
    /// the list length
    Cases(Vec<TestCase>),
}

/// Outcome of one verification, derived purely from the harness's stdout
/// plus the raw execution diagnostics
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub passed_all: bool,
    pub num_passed: usize,
    pub num_total: usize,
    pub stdout: String,
    pub stderr: String,
    pub exception: Option<String>,
    pub time_s: f64,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Verification Result ===")?;
        writeln!(f, "passed_all: {}", self.passed_all)?;
        writeln!(f, "num_passed/num_total: {} / {}", self.num_passed, self.num_total)?;
        if !self.stdout.is_empty() {
            writeln!(f, "--- stdout ---")?;
            writeln!(f, "{}", self.stdout.trim())?;
        }
        if !self.stderr.is_empty() {
            writeln!(f, "--- stderr ---")?;
            writeln!(f, "{}", self.stderr.trim())?;
        }
        if let Some(exception) = &self.exception {
            writeln!(f, "exception: {exception}")?;
        }
        write!(f, "time_s: {:.4}", self.time_s)
    }
}

/// Verifies candidate code against a test suite through a sandboxed run
///
/// The executor is injected so callers can pick local rlimit containment or
/// container isolation without touching this code. Each `verify` call builds
/// a fresh harness, runs it exactly once, and reduces the markers; retries,
/// if any, belong to the caller.
pub struct Verifier {
    executor: Box<dyn SandboxExecutor>,
    timeout: Duration,
    limits: ResourceLimits,
}

impl Verifier {
    pub fn new(executor: Box<dyn SandboxExecutor>, timeout_s: u64, limits: ResourceLimits) -> Self {
        Self {
            executor,
            timeout: Duration::from_secs(timeout_s),
            limits,
        }
    }

    /// Runs one verification: build harness, execute, parse markers
    pub async fn verify(
        &self,
        code: &str,
        function_name: &str,
        suite: &TestSuite,
    ) -> Result<VerificationResult> {
        let program = match suite {
            TestSuite::Snippet(snippet) => build_snippet_harness(code, function_name, snippet),
            TestSuite::Cases(cases) => build_structured_harness(code, function_name, cases),
        };

        let result = self
            .executor
            .execute(&program, self.timeout, &self.limits)
            .await?;

        Ok(Self::reduce(result))
    }

    fn reduce(result: ExecResult) -> VerificationResult {
        let summary = parse_marker_summary(&result.stdout);
        if let Some(exception) = &result.exception {
            log::debug!("Sandboxed run reported {exception}");
        }

        VerificationResult {
            passed_all: summary.passed_all,
            num_passed: summary.num_passed,
            num_total: summary.num_total,
            stdout: result.stdout,
            stderr: result.stderr,
            exception: result.exception,
            time_s: result.time_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_case_deserializes_with_defaults() {
        let case: TestCase = serde_json::from_str(r#"{"args": [1, 2]}"#).unwrap();
        assert_eq!(case.name, "");
        assert_eq!(case.args.len(), 2);
        assert!(case.kwargs.is_empty());
        assert_eq!(case.expected, Value::Null);
    }

    #[test]
    fn test_case_list_deserializes_from_generator_schema() {
        let raw = r#"[
            {"name": "basic", "args": [1, 2], "kwargs": {}, "expected": 3},
            {"name": "negative", "args": [-1, 1], "kwargs": {}, "expected": 0}
        ]"#;
        let cases: Vec<TestCase> = serde_json::from_str(raw).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name, "basic");
        assert_eq!(cases[1].expected, serde_json::json!(0));
    }

    #[test]
    fn reduce_carries_execution_diagnostics_through() {
        let verification = Verifier::reduce(ExecResult {
            ok: false,
            stdout: "__COUNTS__= 1 / 3\n".to_string(),
            stderr: "boom".to_string(),
            exception: Some("returncode:1".to_string()),
            time_s: 0.25,
        });

        assert!(!verification.passed_all);
        assert_eq!(verification.num_passed, 1);
        assert_eq!(verification.num_total, 3);
        assert_eq!(verification.stderr, "boom");
        assert_eq!(verification.exception.as_deref(), Some("returncode:1"));
    }

    #[test]
    fn display_report_includes_verdict_and_exception() {
        let verification = Verifier::reduce(ExecResult {
            ok: false,
            stdout: String::new(),
            stderr: String::new(),
            exception: Some("timeout".to_string()),
            time_s: 2.0,
        });

        let report = verification.to_string();
        assert!(report.contains("passed_all: false"));
        assert!(report.contains("num_passed/num_total: 0 / 0"));
        assert!(report.contains("exception: timeout"));
        assert!(report.contains("time_s: 2.0000"));
    }
}
