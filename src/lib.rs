//! whyismybuildslow - explain slow builds by their silences
//!
//! Wraps a build or test command, records a timestamped timeline of its output,
//! and attributes every idle gap (a silence longer than a threshold) to a
//! probable cause: network wait, cold cache, Docker image pull, or unknown.
//!
//! Pipeline: [`supervisor`] spawns the child and drains its output into a
//! [`timeline`]; after exit, [`idle_gap`] scans the timeline and asks the
//! [`classifier`] about each gap; results feed the live [`display`] actor and
//! the [`text_output`] / [`json_output`] reporters.

pub mod classifier;
pub mod cli;
pub mod display;
pub mod idle_gap;
pub mod json_output;
pub mod supervisor;
pub mod text_output;
pub mod timeline;
