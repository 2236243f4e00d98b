//! Reduces harness stdout to an aggregate verdict by scanning for marker
//! lines. A single corrupted line never invalidates markers parsed before or
//! after it.

/// Aggregate verdict extracted from harness stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkerSummary {
    pub passed_all: bool,
    pub num_passed: usize,
    pub num_total: usize,
}

/// Parses the marker protocol out of captured stdout
///
/// An explicit `__RESULT__=` line is authoritative, even when inconsistent
/// with the counts; the last occurrence wins. Only when no result line is
/// present anywhere and `num_total > 0` is the verdict inferred from the
/// counts. Empty or missing stdout yields an all-zero failure. `__CASE__`
/// lines are diagnostics for humans and are never aggregated here.
pub fn parse_marker_summary(stdout: &str) -> MarkerSummary {
    let mut summary = MarkerSummary::default();
    if stdout.is_empty() {
        return summary;
    }

    let mut result_line_seen = false;
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(verdict) = line.strip_prefix("__RESULT__=") {
            summary.passed_all = verdict.trim() == "OK";
            result_line_seen = true;
        } else if let Some(counts) = line.strip_prefix("__COUNTS__=") {
            match parse_counts(counts) {
                Some((passed, total)) => {
                    summary.num_passed = passed;
                    summary.num_total = total;
                }
                None => log::warn!("Ignoring malformed counts line: {line}"),
            }
        }
    }

    if !result_line_seen && summary.num_total > 0 {
        summary.passed_all = summary.num_passed == summary.num_total;
    }

    summary
}

/// Parses the tail of a counts line, "` <passed> / <total>`"
fn parse_counts(tail: &str) -> Option<(usize, usize)> {
    let (left, right) = tail.split_once('/')?;
    let passed = left.trim().parse().ok()?;
    let total = right.trim().parse().ok()?;
    Some((passed, total))
}
