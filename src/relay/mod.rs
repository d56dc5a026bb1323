//! Relay: the single task that owns the vehicle state and connection registry

pub mod registry;
pub mod session;

pub use registry::ConnectionStats;
pub use session::{Relay, RelayError, RelayEvent, RelayHandle};
