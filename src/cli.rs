//! CLI argument parsing for whyismybuildslow

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "whyismybuildslow")]
#[command(version)]
#[command(
    about = "Run a build and explain why it was slow",
    long_about = None,
    override_usage = "whyismybuildslow [run] [OPTIONS] -- <COMMAND>...",
    after_help = "Examples:\n  whyismybuildslow run -- npm install\n  whyismybuildslow run --no-ui -- sleep 4\n  whyismybuildslow run --json -- sleep 2"
)]
pub struct Cli {
    /// Optional `run` word before the options (accepted for compatibility)
    #[arg(value_parser = ["run"], hide = true)]
    pub run: Option<String>,

    /// Disable the animated live display (CI / logs)
    #[arg(long = "no-ui")]
    pub no_ui: bool,

    /// Print a machine-readable JSON summary on stdout (implies --no-ui)
    #[arg(long)]
    pub json: bool,

    /// Idle-gap threshold in seconds; only longer silences are classified
    #[arg(long, value_name = "SECONDS", default_value = "2.0")]
    pub threshold: f64,

    /// Extra cause rules (TOML), evaluated before the built-in rules
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Enable debug tracing on stderr
    #[arg(long)]
    pub debug: bool,

    /// Command to run (everything after --)
    #[arg(last = true)]
    pub command: Option<Vec<String>>,
}

impl Cli {
    /// Whether the live display should be attached, terminal permitting
    pub fn wants_display(&self) -> bool {
        !self.no_ui && !self.json
    }
}
