//! CLI argument definitions using clap
//!
//! Commands:
//! - entity-ledger inspect --ledger <dir>
//! - entity-ledger verify --ledger <dir> [--config <path>]
//! - entity-ledger merge --ledger <dir> --from <dir> [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// entity-ledger - inspect and maintain event-sourced entity ledgers
#[derive(Parser, Debug)]
#[command(name = "entity-ledger")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter, overrides the settings file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the sorted transactions of a ledger
    Inspect {
        /// Ledger directory
        #[arg(long)]
        ledger: PathBuf,
    },

    /// Decrypt and validate every transaction of a ledger
    Verify {
        /// Ledger directory
        #[arg(long)]
        ledger: PathBuf,

        /// Path to a settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Append the unknown transactions of another ledger
    Merge {
        /// Target ledger directory
        #[arg(long)]
        ledger: PathBuf,

        /// Source ledger directory
        #[arg(long)]
        from: PathBuf,

        /// Path to a settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merge() {
        let cli = Cli::try_parse_from([
            "entity-ledger",
            "merge",
            "--ledger",
            "a",
            "--from",
            "b",
        ])
        .unwrap();
        match cli.command {
            Command::Merge { ledger, from, config } => {
                assert_eq!(ledger, PathBuf::from("a"));
                assert_eq!(from, PathBuf::from("b"));
                assert!(config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_ledger_is_required() {
        assert!(Cli::try_parse_from(["entity-ledger", "inspect"]).is_err());
    }
}
