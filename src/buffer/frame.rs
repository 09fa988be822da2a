//! Nested tracking frames
//!
//! While a frame is open, recorded manipulations are diverted into it. Closing
//! folds them into a single compound. Frames close on drop if not closed
//! explicitly, so nesting is always LIFO.

use std::future::Future;

use crate::manipulation::Manipulation;

use super::manipulation_buffer::ManipulationBuffer;

pub(crate) struct FrameState {
    pub(crate) token: u64,
    pub(crate) extend_on: Option<Manipulation>,
    pub(crate) manipulations: Vec<Manipulation>,
}

impl FrameState {
    pub(crate) fn new(token: u64, extend_on: Option<Manipulation>) -> Self {
        let manipulations = extend_on.iter().cloned().collect();
        Self {
            token,
            extend_on,
            manipulations,
        }
    }
}

/// Handle onto an open frame of a [`ManipulationBuffer`].
///
/// The handle is bound to its frame by a token, so a handle whose frame was
/// already folded by an enclosing close never touches a later frame.
pub struct ManipulationFrame {
    buffer: ManipulationBuffer,
    token: u64,
    closed: bool,
}

impl ManipulationFrame {
    pub(crate) fn new(buffer: ManipulationBuffer, token: u64) -> Self {
        Self {
            buffer,
            token,
            closed: false,
        }
    }

    /// Runs `f` inside the frame, then closes it.
    pub fn run<R>(mut self, f: impl FnOnce() -> R) -> R {
        let result = f();
        self.close_once();
        result
    }

    /// Awaits `future` inside the frame, then closes it.
    pub async fn run_async<F: Future>(mut self, future: F) -> F::Output {
        let result = future.await;
        self.close_once();
        result
    }

    /// Closes the frame. Returns the recorded compound, or `None` when the
    /// frame captured nothing.
    pub fn close(mut self) -> Option<Manipulation> {
        self.close_once()
    }

    fn close_once(&mut self) -> Option<Manipulation> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.buffer.close_frame(self.token)
    }
}

impl Drop for ManipulationFrame {
    fn drop(&mut self) {
        self.close_once();
    }
}
