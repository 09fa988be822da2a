//! CLI for inspecting, verifying and merging file ledgers
//!
//! - inspect: sorted transaction metadata as JSON lines
//! - verify: integrity check of every transaction without applying it
//! - merge: validated bulk append from another ledger directory

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{inspect, merge, run, run_command, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_json};
