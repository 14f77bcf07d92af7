//! Idle-gap cause classification
//!
//! Maps the output line before a gap, the line after it, and the gap length to
//! a probable cause. Rules are an ordered list evaluated first-match-wins, most
//! specific first, because the keyword sets overlap ("docker pull ... request"
//! matches both Docker and Network and must come out as Docker).
//!
//! Built-in priority:
//!
//! | # | Matcher | Cause | Confidence |
//! |---|---------|-------|------------|
//! | 1 | docker, pull, layer, extracting, image, sha256 | Docker | 0.9 |
//! | 2 | cache, rebuilding, invalidated, cold, node_modules, recompile | Cache | 0.8 |
//! | 3 | download, fetch, http, https, registry, connecting, request | Network | 0.85 |
//! | 4 | gap >= 2s | Network | 0.6 |
//! | - | anything else | Unknown | 0.3 |
//!
//! Keyword matching is case-insensitive substring search over either text.
//! The confidences and the 2s fallback are fixed tuning constants.
//!
//! Extra rules can be loaded from a TOML rule pack; they are evaluated before
//! the built-ins.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Probable cause of an idle gap
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Cause {
    #[default]
    Unknown,
    Network,
    Cache,
    Docker,
    /// Cause named by a user rule pack
    Custom(String),
}

impl Cause {
    pub fn as_str(&self) -> &str {
        match self {
            Cause::Unknown => "unknown",
            Cause::Network => "network",
            Cause::Cache => "cache",
            Cause::Docker => "docker",
            Cause::Custom(name) => name,
        }
    }

    /// Resolve a cause name, mapping the built-in names to their variants
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "unknown" => Cause::Unknown,
            "network" => Cause::Network,
            "cache" => Cause::Cache,
            "docker" => Cause::Docker,
            _ => Cause::Custom(name.trim().to_string()),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Cause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outcome of classifying one idle gap. Never fails; Unknown at 0.3 is the floor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub cause: Cause,
    /// Short character name shown in reports (e.g. "🐌 Network Slug")
    pub label: String,
    pub explanation: String,
    /// Heuristic score in [0, 1], not a calibrated probability
    pub confidence: f64,
}

impl ClassificationResult {
    fn unknown() -> Self {
        Self {
            cause: Cause::Unknown,
            label: "🤷 Unknown".to_string(),
            explanation: "Could not confidently determine the cause".to_string(),
            confidence: 0.3,
        }
    }
}

/// Predicate half of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Any keyword is a substring of either context (lowercased)
    Keywords(Vec<String>),
    /// The gap is at least this many seconds
    MinGap(f64),
}

/// One `(predicate, cause, confidence)` entry of the ordered rule list
#[derive(Debug, Clone, PartialEq)]
pub struct CauseRule {
    pub matcher: Matcher,
    pub cause: Cause,
    pub label: String,
    pub explanation: String,
    pub confidence: f64,
}

impl CauseRule {
    pub fn keywords(
        keywords: &[&str],
        cause: Cause,
        label: &str,
        explanation: &str,
        confidence: f64,
    ) -> Self {
        Self {
            matcher: Matcher::Keywords(keywords.iter().map(|k| k.to_lowercase()).collect()),
            cause,
            label: label.to_string(),
            explanation: explanation.to_string(),
            confidence,
        }
    }

    pub fn min_gap(
        seconds: f64,
        cause: Cause,
        label: &str,
        explanation: &str,
        confidence: f64,
    ) -> Self {
        Self {
            matcher: Matcher::MinGap(seconds),
            cause,
            label: label.to_string(),
            explanation: explanation.to_string(),
            confidence,
        }
    }

    /// `prev` and `next` must already be lowercased
    fn matches(&self, prev: &str, next: &str, gap_seconds: f64) -> bool {
        match &self.matcher {
            Matcher::Keywords(keywords) => keywords
                .iter()
                .any(|k| prev.contains(k.as_str()) || next.contains(k.as_str())),
            Matcher::MinGap(min) => gap_seconds >= *min,
        }
    }

    fn result(&self) -> ClassificationResult {
        ClassificationResult {
            cause: self.cause.clone(),
            label: self.label.clone(),
            explanation: self.explanation.clone(),
            confidence: self.confidence,
        }
    }
}

/// Errors loading a TOML rule pack
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid rule #{index}: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDef {
    cause: String,
    label: String,
    explanation: String,
    confidence: f64,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    min_gap_seconds: Option<f64>,
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<RuleDef>,
}

impl RuleDef {
    fn into_rule(self, index: usize) -> Result<CauseRule, RuleError> {
        let invalid = |reason: &str| RuleError::Invalid {
            index,
            reason: reason.to_string(),
        };

        if self.cause.trim().is_empty() {
            return Err(invalid("cause must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid(&format!(
                "confidence must be in [0, 1], got {}",
                self.confidence
            )));
        }

        let matcher = match (self.keywords, self.min_gap_seconds) {
            (Some(keywords), None) => {
                let keywords: Vec<String> = keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keywords.is_empty() {
                    return Err(invalid("keywords must contain at least one non-empty entry"));
                }
                Matcher::Keywords(keywords)
            }
            (None, Some(seconds)) => {
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(invalid("min_gap_seconds must be a finite number >= 0"));
                }
                Matcher::MinGap(seconds)
            }
            _ => return Err(invalid("exactly one of keywords or min_gap_seconds is required")),
        };

        Ok(CauseRule {
            matcher,
            cause: Cause::from_name(&self.cause),
            label: self.label,
            explanation: self.explanation,
            confidence: self.confidence,
        })
    }
}

/// Ordered rule list, evaluated first-match-wins
///
/// # Example
/// ```
/// use whyismybuildslow::classifier::{Cause, CauseRules};
///
/// let rules = CauseRules::from_toml_str(r#"
///     [[rule]]
///     cause = "gradle"
///     label = "🐘 Gradle Daemon"
///     explanation = "Gradle daemon was starting"
///     confidence = 0.75
///     keywords = ["daemon"]
/// "#)?
/// .with_builtin();
///
/// let result = rules.classify("Starting a Gradle Daemon", "", 4.0);
/// assert_eq!(result.cause, Cause::Custom("gradle".into()));
///
/// let result = rules.classify("docker pull node:20", "", 4.0);
/// assert_eq!(result.cause, Cause::Docker);
/// # Ok::<(), whyismybuildslow::classifier::RuleError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CauseRules {
    rules: Vec<CauseRule>,
}

impl Default for CauseRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CauseRules {
    pub fn new(rules: Vec<CauseRule>) -> Self {
        Self { rules }
    }

    /// The reference rule set, in priority order
    pub fn builtin() -> Self {
        Self::new(vec![
            CauseRule::keywords(
                &["docker", "pull", "layer", "extracting", "image", "sha256"],
                Cause::Docker,
                "🚚 Docker Truck",
                "Build was pulling or extracting Docker images",
                0.9,
            ),
            CauseRule::keywords(
                &[
                    "cache",
                    "rebuilding",
                    "invalidated",
                    "cold",
                    "node_modules",
                    "recompile",
                ],
                Cause::Cache,
                "🧊 Cache Golem",
                "Build cache was cold or invalidated",
                0.8,
            ),
            CauseRule::keywords(
                &[
                    "download",
                    "fetch",
                    "http",
                    "https",
                    "registry",
                    "connecting",
                    "request",
                ],
                Cause::Network,
                "🐌 Network Slug",
                "Build was waiting on network activity",
                0.85,
            ),
            CauseRule::min_gap(
                2.0,
                Cause::Network,
                "🐌 Network Slug",
                "Build was blocked by an external or idle wait",
                0.6,
            ),
        ])
    }

    /// Load rules from a TOML rule pack file (`[[rule]]` tables)
    ///
    /// Only the rules in the file are returned; chain [`CauseRules::with_builtin`]
    /// to fall through to the reference rules.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(content)?;
        let rules = file
            .rule
            .into_iter()
            .enumerate()
            .map(|(i, def)| def.into_rule(i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// Append the built-in rules after the current ones
    pub fn with_builtin(mut self) -> Self {
        self.rules.extend(Self::builtin().rules);
        self
    }

    pub fn rules(&self) -> &[CauseRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule's result, or Unknown (0.3) when nothing matches
    pub fn classify(&self, prev: &str, next: &str, gap_seconds: f64) -> ClassificationResult {
        let prev = prev.to_lowercase();
        let next = next.to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.matches(&prev, &next, gap_seconds))
            .map(CauseRule::result)
            .unwrap_or_else(ClassificationResult::unknown)
    }
}

/// Classify a gap with the built-in rules
///
/// Pure and deterministic: the same inputs always give the same result.
pub fn classify(prev: &str, next: &str, gap_seconds: f64) -> ClassificationResult {
    static BUILTIN: OnceLock<CauseRules> = OnceLock::new();
    BUILTIN
        .get_or_init(CauseRules::builtin)
        .classify(prev, next, gap_seconds)
}
