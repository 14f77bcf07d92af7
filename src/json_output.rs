//! JSON summary output for `--json`
//!
//! One pretty-printed object per run, written to stdout.

use crate::classifier::Cause;
use crate::idle_gap::GapSummary;
use crate::supervisor::RunOutcome;
use serde::Serialize;
use std::time::Duration;

/// Machine-readable result of a run
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Wrapped command line, space-joined
    pub command: String,
    pub elapsed_seconds: f64,
    /// Cause of the last idle gap ("unknown" if none)
    pub cause: Cause,
    pub exit_code: i32,
    /// Every idle gap in the order it occurred
    pub gaps: Vec<GapSummary>,
}

impl JsonSummary {
    pub fn from_outcome(argv: &[String], outcome: &RunOutcome) -> Self {
        Self {
            command: argv.join(" "),
            elapsed_seconds: outcome.elapsed.as_secs_f64(),
            cause: outcome.cause(),
            exit_code: outcome.exit_code,
            gaps: outcome.report.gaps.iter().map(GapSummary::from).collect(),
        }
    }

    /// Summary for a run that never got a child going
    pub fn failed(argv: &[String], elapsed: Duration, exit_code: i32) -> Self {
        Self {
            command: argv.join(" "),
            elapsed_seconds: elapsed.as_secs_f64(),
            cause: Cause::Unknown,
            exit_code,
            gaps: Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
