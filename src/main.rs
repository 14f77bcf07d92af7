use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use whyismybuildslow::classifier::CauseRules;
use whyismybuildslow::cli::Cli;
use whyismybuildslow::json_output::JsonSummary;
use whyismybuildslow::supervisor::{self, Echo, SupervisorConfig, SupervisorError};
use whyismybuildslow::text_output;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Translate CLI flags into a run configuration
fn build_config(cli: &Cli) -> Result<SupervisorConfig> {
    let rules = match &cli.rules {
        Some(path) => CauseRules::from_toml(path)
            .with_context(|| format!("Failed to load cause rules from {}", path.display()))?
            .with_builtin(),
        None => CauseRules::builtin(),
    };

    let config = SupervisorConfig {
        display: cli.wants_display() && std::io::stderr().is_terminal(),
        echo: if cli.json {
            Echo::Stderr
        } else {
            Echo::Passthrough
        },
        rules,
        ..SupervisorConfig::default()
    }
    .with_threshold_secs(cli.threshold)?;

    Ok(config)
}

fn print_json(summary: &JsonSummary) {
    match summary.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("error: failed to serialize summary: {}", e),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(2);
        }
    };

    let argv = cli.command.clone().unwrap_or_default();
    if !argv.is_empty() && !cli.json {
        eprint!("{}", text_output::render_banner(&argv));
    }

    let started = Instant::now();
    let code = match supervisor::run(&argv, &config) {
        Ok(outcome) => {
            if cli.json {
                print_json(&JsonSummary::from_outcome(&argv, &outcome));
            } else {
                eprint!("{}", text_output::render_report(&outcome, config.threshold));
            }
            outcome.exit_code
        }
        Err(e @ SupervisorError::Usage(_)) => {
            eprintln!("error: {}", e);
            eprintln!("Usage: whyismybuildslow [run] [OPTIONS] -- <COMMAND>...");
            eprintln!("For more information, try '--help'.");
            e.exit_code()
        }
        Err(e) => {
            if cli.json {
                print_json(&JsonSummary::failed(&argv, started.elapsed(), e.exit_code()));
            }
            eprintln!("error: {}", e);
            e.exit_code()
        }
    };

    process::exit(code);
}
