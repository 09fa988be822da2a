//! entity-ledger CLI entry point
//!
//! All logic is delegated to the CLI module.

use entity_ledger::cli;

fn main() {
    if let Err(e) = cli::run() {
        if cli::write_error(e.code_str(), e.message()).is_err() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}
