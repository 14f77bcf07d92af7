//! Idle gap detection over a finished timeline
//!
//! Walks consecutive event pairs in append order and classifies every pair
//! whose time delta is strictly greater than the threshold. Deltas equal to the
//! threshold are not idle gaps and produce no classification at all.

use crate::classifier::{Cause, CauseRules, ClassificationResult};
use crate::timeline::Event;
use serde::Serialize;
use std::time::Duration;

/// Default idle-gap threshold
pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(2);

/// One detected idle gap and its classification
#[derive(Debug, Clone, PartialEq)]
pub struct IdleGap {
    /// Index of the event after the gap in the scanned sequence
    pub index: usize,
    pub gap: Duration,
    pub result: ClassificationResult,
}

/// All gaps of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapReport {
    pub gaps: Vec<IdleGap>,
}

impl GapReport {
    /// Cause of the last detected gap, or Unknown when there were none
    pub fn last_cause(&self) -> Cause {
        self.gaps
            .last()
            .map(|g| g.result.cause.clone())
            .unwrap_or_default()
    }

    /// Sum of all idle time
    pub fn total_idle(&self) -> Duration {
        self.gaps.iter().map(|g| g.gap).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Serializable view of one gap for reports
#[derive(Debug, Clone, Serialize)]
pub struct GapSummary {
    pub gap_seconds: f64,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

impl From<&IdleGap> for GapSummary {
    fn from(gap: &IdleGap) -> Self {
        Self {
            gap_seconds: gap.gap.as_secs_f64(),
            result: gap.result.clone(),
        }
    }
}

/// Find and classify idle gaps
///
/// `events` must be a quiesced snapshot (all writers joined). Empty and
/// single-event sequences yield an empty report.
///
/// # Example
/// ```
/// use std::time::{Duration, Instant};
/// use whyismybuildslow::classifier::{Cause, CauseRules};
/// use whyismybuildslow::idle_gap::{detect_idle_gaps, DEFAULT_THRESHOLD};
/// use whyismybuildslow::timeline::{Event, EventKind};
///
/// let t0 = Instant::now();
/// let events = vec![
///     Event::new(t0, EventKind::Output, "Downloading crates ..."),
///     Event::new(t0 + Duration::from_secs(5), EventKind::Output, "Compiling foo"),
/// ];
///
/// let report = detect_idle_gaps(&events, DEFAULT_THRESHOLD, &CauseRules::builtin());
/// assert_eq!(report.gaps.len(), 1);
/// assert_eq!(report.last_cause(), Cause::Network);
/// ```
pub fn detect_idle_gaps(events: &[Event], threshold: Duration, rules: &CauseRules) -> GapReport {
    let gaps = events
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let (prev, curr) = (&pair[0], &pair[1]);
            let gap = curr.timestamp.saturating_duration_since(prev.timestamp);
            if gap <= threshold {
                return None;
            }

            let result = rules.classify(&prev.message, &curr.message, gap.as_secs_f64());
            tracing::debug!(
                index = i + 1,
                gap_secs = gap.as_secs_f64(),
                cause = %result.cause,
                "idle gap detected"
            );
            Some(IdleGap {
                index: i + 1,
                gap,
                result,
            })
        })
        .collect();

    GapReport { gaps }
}
