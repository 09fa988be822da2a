//! Manipulation buffer
//!
//! - `manipulation_buffer`: record/undo/redo, tracking suspension, listeners
//! - `frame`: nested compound frames
//! - `commit_index`: entity → uncommitted manipulation index

mod commit_index;
mod frame;
mod manipulation_buffer;

pub use frame::ManipulationFrame;
pub use manipulation_buffer::{
    BufferEvent, BufferListener, BufferListenerId, BufferState, ManipulationBuffer,
    TrackingSuspension,
};
