//! Command-line surface, adapted from `gateway/src/cli/mod.rs`'s
//! `Cli`/`Command` shape, narrowed to the handful of subcommands this
//! crate's config actually needs (spec §6: environment-variable config,
//! no TOML file — `Config::from_env` is the only loader).

use clap::{Parser, Subcommand};
use mesh_domain::config::{Config, ConfigSeverity};

/// meshctl — a distributed edge-device orchestrator coordinator.
#[derive(Debug, Parser)]
#[command(name = "meshctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the coordinator server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validate the environment-derived config and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults filled in) as JSON.
    Show,
}

/// Parse and validate the config, printing any issues. Returns `true` when
/// there are no `Error`-severity issues.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("config OK");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    println!(
        "\n{error_count} error(s), {} warning(s)",
        issues.len() - error_count
    );
    error_count == 0
}

pub fn show(config: &Config) {
    match serde_json::to_string_pretty(config) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
