use std::fmt::Display;

use serde::Serialize;

use super::DegreeCelsius;

/// Set point for auto mode, limited to [-20, 40] °C on a 0.5 °C grid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TargetTemperature(DegreeCelsius);

impl TargetTemperature {
    pub const MIN: f64 = -20.0;
    pub const MAX: f64 = 40.0;
    pub const STEP: f64 = 0.5;

    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return None;
        }

        let steps = value / Self::STEP;
        if (steps - steps.round()).abs() > 1e-9 {
            return None;
        }

        Some(Self(DegreeCelsius(value)))
    }

    pub fn celsius(&self) -> DegreeCelsius {
        self.0
    }
}

impl Display for TargetTemperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
