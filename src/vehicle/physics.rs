//! Fixed-rate physics step deriving motion from the current controls

use crate::util::time::tick_delta;

use super::state::{Gear, VehicleState};

/// Speed lost per tick at full brake
pub const BRAKE_RATE: f64 = 1.0;
/// Speed gained per tick at full throttle
pub const THROTTLE_RATE: f64 = 0.5;
/// Per-tick speed retention with no pedal pressed
pub const COAST_DECAY: f64 = 0.98;
/// Per-tick rpm retention when out of gear
pub const RPM_DECAY: f64 = 0.95;

pub const MIN_SPEED: f64 = -60.0;
pub const MAX_SPEED: f64 = 120.0;
pub const MAX_RPM: f64 = 6000.0;

const RPM_PER_MPH: f64 = 50.0;
const RPM_PER_THROTTLE: f64 = 1000.0;
/// Scales speed into heading change and plane distance per tick
const MOTION_SCALE: f64 = 0.1;
const SECS_PER_HOUR: f64 = 3600.0;

/// Wrap degrees into `[0, 360)`
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Sign used by the brake: zero counts as positive
fn brake_sign(speed: f64) -> f64 {
    if speed < 0.0 {
        -1.0
    } else {
        1.0
    }
}

impl VehicleState {
    /// Advance the simulation by one tick
    pub fn step_physics(&mut self, now: u64) {
        let controls = &self.controls;
        let motion = &mut self.motion;

        if controls.brake > 0.0 {
            motion.speed -= brake_sign(motion.speed) * controls.brake * BRAKE_RATE;
            motion.accelerating = false;
        } else if controls.throttle > 0.0 {
            match controls.gear {
                Gear::D => {
                    motion.speed += controls.throttle * THROTTLE_RATE;
                    motion.accelerating = true;
                }
                Gear::R => {
                    motion.speed -= controls.throttle * THROTTLE_RATE;
                    motion.accelerating = true;
                }
                // Revving out of gear; `accelerating` keeps last tick's value
                Gear::P | Gear::N | Gear::S => {}
            }
        } else {
            motion.speed *= COAST_DECAY;
            motion.accelerating = false;
        }

        motion.speed = motion.speed.clamp(MIN_SPEED, MAX_SPEED);

        self.cockpit.rpm = if controls.gear.is_engaged() {
            (motion.speed * RPM_PER_MPH + controls.throttle * RPM_PER_THROTTLE).clamp(0.0, MAX_RPM)
        } else {
            self.cockpit.rpm * RPM_DECAY
        };

        // Heading and position only move going forward
        if motion.speed > 0.0 {
            motion.direction =
                wrap_degrees(motion.direction + controls.steering * motion.speed * MOTION_SCALE);
            let heading = motion.direction.to_radians();
            motion.x += heading.cos() * motion.speed * MOTION_SCALE;
            motion.y += heading.sin() * motion.speed * MOTION_SCALE;
        }

        let miles = motion.speed.abs() * tick_delta() / SECS_PER_HOUR;
        self.cockpit.trip += miles;
        self.cockpit.odometer += miles;

        self.touch(now);
    }
}
