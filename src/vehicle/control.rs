//! Control inputs: wire command parsing, validation and application

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{Gear, VehicleState};

/// Control command as it arrives on the wire: `{ "type": ..., "value": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl ControlCommand {
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// A validated control input
#[derive(Debug, Clone, PartialEq)]
pub enum ControlInput {
    Throttle(f64),
    Brake(f64),
    Steering(f64),
    Gear(Gear),
    Lights(bool),
    LeftSignal(bool),
    RightSignal(bool),
    Hazards(bool),
    /// Unknown control type; applying it is a no-op
    Unrecognized(String),
}

/// Result of applying a control input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// State was updated and stamped
    Applied,
    /// Unrecognized control, state untouched
    Ignored,
}

/// Control validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("Invalid gear: {0} (expected one of P, R, N, D, S)")]
    InvalidGear(String),

    #[error("Invalid value for {control}: expected {expected}")]
    InvalidValue {
        control: &'static str,
        expected: &'static str,
    },
}

impl ControlError {
    /// Short machine-readable code for error events
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::InvalidGear(_) => "invalid_gear",
            ControlError::InvalidValue { .. } => "invalid_value",
        }
    }
}

impl TryFrom<&ControlCommand> for ControlInput {
    type Error = ControlError;

    fn try_from(cmd: &ControlCommand) -> Result<Self, Self::Error> {
        let input = match cmd.kind.as_str() {
            "throttle" => ControlInput::Throttle(number(&cmd.value, "throttle")?),
            "brake" => ControlInput::Brake(number(&cmd.value, "brake")?),
            "steering" => ControlInput::Steering(number(&cmd.value, "steering")?),
            "gear" => match &cmd.value {
                Value::String(s) => ControlInput::Gear(s.parse()?),
                other => return Err(ControlError::InvalidGear(other.to_string())),
            },
            "lights" => ControlInput::Lights(flag(&cmd.value, "lights")?),
            "leftSignal" => ControlInput::LeftSignal(flag(&cmd.value, "leftSignal")?),
            "rightSignal" => ControlInput::RightSignal(flag(&cmd.value, "rightSignal")?),
            "hazards" => ControlInput::Hazards(flag(&cmd.value, "hazards")?),
            other => ControlInput::Unrecognized(other.to_string()),
        };
        Ok(input)
    }
}

fn number(value: &Value, control: &'static str) -> Result<f64, ControlError> {
    value.as_f64().ok_or(ControlError::InvalidValue {
        control,
        expected: "a number",
    })
}

fn flag(value: &Value, control: &'static str) -> Result<bool, ControlError> {
    value.as_bool().ok_or(ControlError::InvalidValue {
        control,
        expected: "a boolean",
    })
}

/// Clamp into `[lo, hi]`, sending NaN to the neutral position
fn clamp_or_neutral(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(lo, hi)
    }
}

impl VehicleState {
    /// Apply one control input. Numeric values are clamped, never rejected.
    pub fn apply_control_input(&mut self, input: ControlInput, now: u64) -> ControlOutcome {
        match input {
            ControlInput::Throttle(v) => self.controls.throttle = clamp_or_neutral(v, 0.0, 1.0),
            ControlInput::Brake(v) => self.controls.brake = clamp_or_neutral(v, 0.0, 1.0),
            ControlInput::Steering(v) => self.controls.steering = clamp_or_neutral(v, -1.0, 1.0),
            ControlInput::Gear(gear) => self.controls.gear = gear,
            ControlInput::Lights(on) => self.systems.lights = on,
            ControlInput::LeftSignal(on) => self.systems.left_signal = on,
            ControlInput::RightSignal(on) => self.systems.right_signal = on,
            ControlInput::Hazards(on) => self.systems.hazards = on,
            ControlInput::Unrecognized(_) => return ControlOutcome::Ignored,
        }

        self.touch(now);
        ControlOutcome::Applied
    }
}
