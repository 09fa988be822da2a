//! Start/finish logging for a timed operation

use std::time::Instant;

use tracing::{error, info, warn};

/// Logs `{name}_start` on creation and `{name}_ok` or `{name}_error` when
/// finished, both with the elapsed time. A scope dropped unfinished logs
/// `{name}_incomplete`.
///
/// ```ignore
/// let scope = OperationScope::new("load");
/// match do_load().await {
///     Ok(count) => scope.complete(count),
///     Err(e) => scope.fail(&e),
/// }
/// ```
pub struct OperationScope {
    name: &'static str,
    start: Instant,
    finished: bool,
}

impl OperationScope {
    pub fn new(name: &'static str) -> Self {
        info!(event = %format!("{}_start", name));
        Self {
            name,
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Logs success with the number of items the operation handled.
    pub fn complete(mut self, items: usize) {
        self.finished = true;
        info!(
            event = %format!("{}_ok", self.name),
            items,
            duration_ms = self.elapsed_ms()
        );
    }

    pub fn fail(mut self, reason: &dyn std::fmt::Display) {
        self.finished = true;
        error!(
            event = %format!("{}_error", self.name),
            error = %reason,
            duration_ms = self.elapsed_ms()
        );
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                event = %format!("{}_incomplete", self.name),
                duration_ms = self.elapsed_ms()
            );
        }
    }
}
