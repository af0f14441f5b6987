//! CLI Definition
//!
//! Command-line surface for the scanner.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Token Scout - New Listing Discovery and Filtering Pipeline
#[derive(Parser, Debug)]
#[command(
    name = "token-scout",
    version = env!("CARGO_PKG_VERSION"),
    about = "Discovers newly listed tokens and filters them against a strategy",
    long_about = "Token Scout polls discovery feeds for newly listed tokens, reconciles \
                  the records into canonical candidates, selectively enriches the fields \
                  a strategy actually checks, and prints the survivors."
)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one discovery and filtering round, print the accepted candidates
    Scan(ScanCmd),

    /// Poll continuously, printing accepted candidates as rounds complete
    Watch(WatchCmd),
}

#[derive(Parser, Debug)]
pub struct ScanCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Path to the strategy file (TOML)
    #[arg(short, long, value_name = "FILE", default_value = "config/strategy.toml")]
    pub strategy: PathBuf,

    /// Emit results as JSON instead of the table view
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct WatchCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Path to the strategy file (TOML)
    #[arg(short, long, value_name = "FILE", default_value = "config/strategy.toml")]
    pub strategy: PathBuf,

    /// Override the poll interval, in seconds
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_defaults() {
        let app = CliApp::parse_from(["token-scout", "scan"]);
        match app.command {
            Command::Scan(cmd) => {
                assert!(!cmd.json);
                assert_eq!(cmd.config, PathBuf::from("config/default.toml"));
            }
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn test_watch_interval_override() {
        let app = CliApp::parse_from(["token-scout", "watch", "--interval", "5"]);
        match app.command {
            Command::Watch(cmd) => assert_eq!(cmd.interval, Some(5)),
            _ => panic!("expected watch command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let app = CliApp::parse_from(["token-scout", "-v", "scan", "--json"]);
        assert!(app.verbose);
    }
}
