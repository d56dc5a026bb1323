//! Time utilities for the physics tick and state timestamps

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Physics ticks per second (compiled in, not configurable)
pub const PHYSICS_TPS: u32 = 20;
pub const TICK_DURATION_MILLIS: u64 = 1_000 / PHYSICS_TPS as u64;

/// Interval between physics ticks
pub fn tick_interval() -> Duration {
    Duration::from_millis(TICK_DURATION_MILLIS)
}

/// Delta time of one physics tick (in seconds)
pub fn tick_delta() -> f64 {
    1.0 / PHYSICS_TPS as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_fifty_millis() {
        assert_eq!(tick_interval(), Duration::from_millis(50));
        assert!((tick_delta() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn unix_millis_is_after_2020() {
        assert!(unix_millis() > 1_577_836_800_000);
    }
}
