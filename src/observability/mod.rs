//! Logging setup and operation scopes
//!
//! Every subsystem logs through `tracing` with an `event` field naming what
//! happened. The binary installs a fmt subscriber via [`init_logging`];
//! library users may install their own.

mod scope;

pub use scope::OperationScope;

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered at `level` (an `EnvFilter`
/// directive such as `info` or `entity_ledger=debug`). `RUST_LOG` takes
/// precedence when set.
///
/// Returns `false` if a global subscriber was already installed; calling
/// this more than once is harmless.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_logging("debug");
        let second = init_logging("info");
        // Another test may have installed the subscriber first
        assert!(!second || !first);
        assert!(!init_logging("not a directive ==="));
    }
}
