//! Plain-text rendering of finalized results.

pub mod colors;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

use jtr_protocol::{ResultStatus, TestResult};
use jtr_utils::exit::ExitCode;

pub use colors::ColorProvider;

/// `container#method: status (duration)`.
pub fn format_result_line(result: &TestResult, colors: &ColorProvider) -> String {
    let mut buf = String::new();
    buf.push_str(&result.identity.full_name());
    buf.push_str(": ");
    let (color, status) = format_status(result.detail.status, colors);
    buf.push_str(color);
    buf.push_str(status);
    buf.push_str(colors.reset);
    if let Some(duration) = reported_duration(result) {
        buf.push_str(" (");
        buf.push_str(&format_duration(duration));
        buf.push(')');
    }
    buf
}

fn format_status(status: ResultStatus, colors: &ColorProvider) -> (&'static str, &'static str) {
    match status {
        ResultStatus::Pass => (colors.green_bold, "ok"),
        ResultStatus::Fail => (colors.red_bold, "FAILED"),
        ResultStatus::Skipped => (colors.yellow_bold, "skipped"),
        ResultStatus::Running => ("", "running"),
    }
}

/// Runners report durations in milliseconds.
fn reported_duration(result: &TestResult) -> Option<Duration> {
    let millis = result.detail.duration.as_deref()?.trim().parse().ok()?;
    Some(Duration::from_millis(millis))
}

pub fn format_duration(duration: Duration) -> String {
    const MILLIS_IN_SECOND: u128 = 1000;
    const MILLIS_IN_MINUTE: u128 = 60 * MILLIS_IN_SECOND;

    let millis = duration.as_millis();
    let (minutes, millis) = (millis / MILLIS_IN_MINUTE, millis % MILLIS_IN_MINUTE);
    let (seconds, millis) = (millis / MILLIS_IN_SECOND, millis % MILLIS_IN_SECOND);

    let mut parts = vec![];
    if minutes > 0 {
        parts.push(format!("{minutes} m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds} s"));
    }
    if millis > 0 || parts.is_empty() {
        parts.push(format!("{millis} ms"));
    }
    parts.join(", ")
}

/// The failure's trace (or just its message) under a header naming the test. `None` for results
/// that didn't fail.
pub fn format_failure(result: &TestResult, colors: &ColorProvider) -> Option<String> {
    if result.detail.status != ResultStatus::Fail {
        return None;
    }
    let mut buf = format!(
        "--- {}: {}FAILED{} ---\n",
        result.identity.full_name(),
        colors.red_bold,
        colors.reset
    );
    let detail = &result.detail;
    if let Some(body) = detail.trace.as_deref().or(detail.message.as_deref()) {
        buf.push_str(body);
        buf.push('\n');
    }
    Some(buf)
}

/// Counts over the results of a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Failed tests, by project.
    pub failures: BTreeMap<String, Vec<String>>,
}

impl RunSummary {
    pub fn new(results: &[TestResult]) -> Self {
        let mut summary = Self {
            tests: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.detail.status {
                ResultStatus::Pass => summary.passed += 1,
                ResultStatus::Skipped => summary.skipped += 1,
                ResultStatus::Fail => {
                    summary.failed += 1;
                    summary
                        .failures
                        .entry(result.identity.project.clone())
                        .or_default()
                        .push(result.identity.full_name());
                }
                ResultStatus::Running => {}
            }
        }
        summary
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failed > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

pub fn format_summary(summary: &RunSummary, wall_time: Duration, colors: &ColorProvider) -> String {
    // Finished in X seconds
    // M tests, N failures, K skipped
    let mut buf = String::new();
    let seconds = wall_time.as_millis() as f64 / 1000.;
    let _ = writeln!(buf, "{}Finished in {seconds:.2} seconds{}", colors.bold, colors.reset);

    let failures_color = if summary.failed > 0 {
        colors.red_bold
    } else {
        colors.green_bold
    };
    let _ = write!(
        buf,
        "{}{} tests{}, {failures_color}{} failures{}",
        colors.green_bold, summary.tests, colors.reset, summary.failed, colors.reset
    );
    if summary.skipped > 0 {
        let _ = write!(
            buf,
            ", {}{} skipped{}",
            colors.yellow_bold, summary.skipped, colors.reset
        );
    }
    buf.push('\n');

    if !summary.failures.is_empty() {
        buf.push_str("\nFailures:\n");
        for (project, tests) in &summary.failures {
            let _ = writeln!(buf, "\n    {project}:");
            for test in tests {
                let _ = writeln!(buf, "        {test}");
            }
        }
    }
    buf
}
