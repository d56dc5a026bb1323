//! The authoritative vehicle-state record
//!
//! Field names serialize in camelCase because the dashboards read them as-is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::control::ControlError;

/// Transmission position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gear {
    /// Park
    #[default]
    P,
    /// Reverse
    R,
    /// Neutral
    N,
    /// Drive
    D,
    /// Sport
    S,
}

impl Gear {
    /// Gears in which the engine drives the wheels
    pub fn is_engaged(self) -> bool {
        matches!(self, Gear::D | Gear::R)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gear::P => "P",
            Gear::R => "R",
            Gear::N => "N",
            Gear::D => "D",
            Gear::S => "S",
        }
    }
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gear {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(Gear::P),
            "R" => Ok(Gear::R),
            "N" => Ok(Gear::N),
            "D" => Ok(Gear::D),
            "S" => Ok(Gear::S),
            other => Err(ControlError::InvalidGear(other.to_string())),
        }
    }
}

/// Motion state, derived by the physics tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Motion {
    /// Signed speed in mph (-60..=120)
    pub speed: f64,
    /// Heading in degrees (0..360)
    pub direction: f64,
    pub x: f64,
    pub y: f64,
    pub accelerating: bool,
}

/// Operator controls, set only through control inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    /// 0.0 idle to 1.0 full throttle
    pub throttle: f64,
    /// 0.0 released to 1.0 full brake
    pub brake: f64,
    /// -1.0 full left to 1.0 full right
    pub steering: f64,
    pub gear: Gear,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Systems {
    pub lights: bool,
    pub left_signal: bool,
    pub right_signal: bool,
    pub hazards: bool,
}

/// Instrument cluster readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cockpit {
    /// Engine speed (0..=6000)
    pub rpm: f64,
    /// Percent
    pub fuel: f64,
    /// Percent
    pub battery: f64,
    pub warnings: Vec<String>,
    /// Trip mileage
    pub trip: f64,
    /// Total mileage, never decreases
    pub odometer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub speed_limit: f64,
    /// Passed through to clients untouched
    pub nearby_traffic: Vec<serde_json::Value>,
    pub alerts: Vec<String>,
}

/// The single authoritative vehicle record, owned by the relay task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub motion: Motion,
    pub controls: Controls,
    pub systems: Systems,
    pub cockpit: Cockpit,
    pub environment: Environment,
    /// Unix millis of the last mutation
    pub timestamp: u64,
}

impl VehicleState {
    /// Fresh state as the server boots
    pub fn new(now: u64) -> Self {
        Self {
            motion: Motion {
                speed: 0.0,
                direction: 0.0,
                x: 100.0,
                y: 100.0,
                accelerating: false,
            },
            controls: Controls {
                throttle: 0.0,
                brake: 0.0,
                steering: 0.0,
                gear: Gear::P,
            },
            systems: Systems::default(),
            cockpit: Cockpit {
                rpm: 0.0,
                fuel: 85.0,
                battery: 75.0,
                warnings: Vec::new(),
                trip: 0.0,
                odometer: 45234.0,
            },
            environment: Environment {
                speed_limit: 55.0,
                nearby_traffic: Vec::new(),
                alerts: Vec::new(),
            },
            timestamp: now,
        }
    }

    /// Stamp a mutation. Timestamps never go backwards even if the wall
    /// clock does.
    pub(crate) fn touch(&mut self, now: u64) {
        self.timestamp = self.timestamp.max(now);
    }
}
