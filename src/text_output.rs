//! Human-readable run banner and idle-gap report
//!
//! Written to stderr so the child's stdout passes through untouched.

use crate::display::format_elapsed;
use crate::supervisor::RunOutcome;
use std::fmt::Write;
use std::time::Duration;

pub fn render_banner(argv: &[String]) -> String {
    format!(
        "🐌 WhyIsMyBuildSlow starting\n🐌 Running: {}\n",
        argv.join(" ")
    )
}

/// Gap blocks followed by the run summary
pub fn render_report(outcome: &RunOutcome, threshold: Duration) -> String {
    let mut out = String::new();

    if outcome.report.is_empty() {
        let _ = writeln!(
            out,
            "\n🐌 No idle gaps longer than {}",
            format_elapsed(threshold)
        );
    }
    for gap in &outcome.report.gaps {
        let _ = writeln!(
            out,
            "\n{} detected ({})\n{} (confidence {:.0}%)",
            gap.result.label,
            format_elapsed(gap.gap),
            gap.result.explanation,
            gap.result.confidence * 100.0
        );
    }

    let _ = writeln!(out, "\n🐌 Elapsed time: {}", format_elapsed(outcome.elapsed));
    if !outcome.report.is_empty() {
        let _ = writeln!(
            out,
            "🐌 Idle time: {} across {} gap(s)",
            format_elapsed(outcome.report.total_idle()),
            outcome.report.gaps.len()
        );
    }
    let _ = writeln!(out, "🐌 Likely cause: {}", outcome.cause());
    let _ = writeln!(out, "🐌 Exit code: {}", outcome.exit_code);
    out
}
