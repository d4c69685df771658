mod controller;

pub use controller::{ActuatorController, ActuatorSettings, ControllerView, PollOutcome};

use derive_more::derive::{Display, Error};
use serde::Serialize;

use crate::core::unit::OpeningPercentage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorStatus {
    Error,
    Moving,
    Auto,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub is_error: bool,
    pub is_moving: bool,
    pub is_auto: bool,
    pub is_open: bool,
}

impl ActuatorStatus {
    /// Highest priority flag wins: Error > Moving > Auto > Open > Closed.
    pub fn resolve(flags: StatusFlags) -> Self {
        if flags.is_error {
            ActuatorStatus::Error
        } else if flags.is_moving {
            ActuatorStatus::Moving
        } else if flags.is_auto {
            ActuatorStatus::Auto
        } else if flags.is_open {
            ActuatorStatus::Open
        } else {
            ActuatorStatus::Closed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum ControlError {
    #[display("Actuator is in error state")]
    Faulted,

    #[display("Window is already fully open")]
    AlreadyOpen,

    #[display("Window is already closed")]
    AlreadyClosed,

    #[display("Window is moving")]
    Moving,

    #[display("Target temperature must be between -20 and 40 °C in steps of 0.5")]
    TargetOutOfRange,

    #[display("Auto mode requires a target temperature")]
    NoTarget,

    #[display("Opening must be between 0 and 100 %")]
    OpeningOutOfRange,

    #[display("Control loop is not running")]
    Stopped,
}

const SLIDER_STEP: usize = 10;

/// Snaps a slider position to the closest multiple of 10. On a tie the lower step wins,
/// as steps are checked in ascending order.
pub fn snap_to_slider_step(value: f64) -> OpeningPercentage {
    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) };

    let mut best = 0u8;
    let mut best_distance = f64::INFINITY;

    for step in (0..=100u8).step_by(SLIDER_STEP) {
        let distance = (value - step as f64).abs();
        if distance < best_distance {
            best = step;
            best_distance = distance;
        }
    }

    OpeningPercentage::new(best)
}
