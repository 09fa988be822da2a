//! Manipulations
//!
//! - `manipulation`: the invertible change sum type
//! - `marshal`: manipulations → wire JSON with globalId references
//! - `remote`: wire JSON → manipulations resolved against a session

mod errors;
#[allow(clippy::module_inception)]
mod manipulation;
mod marshal;
mod remote;

pub use errors::{WireError, WireResult};
pub use manipulation::{Manipulation, ManipulationKind, ManipulationType, PropertyOwner};
pub use marshal::{marshal_manipulations, wire_root_type};
pub use remote::{decode_manipulations, DecodedManipulations};
