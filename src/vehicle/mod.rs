//! Vehicle state engine: the authoritative record, control inputs and physics

pub mod control;
pub mod physics;
pub mod state;

pub use control::{ControlCommand, ControlInput, ControlOutcome};
pub use state::VehicleState;
