use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Commanded openness of the window, 0 (closed) to 100 (fully open).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpeningPercentage(u8);

impl OpeningPercentage {
    pub const CLOSED: Self = Self(0);
    pub const FULLY_OPEN: Self = Self(100);

    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Rounds to the nearest whole percent and clamps into the valid range. NaN maps to closed.
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::CLOSED;
        }

        Self(value.round().clamp(0.0, 100.0) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_open(&self) -> bool {
        self.0 > 0
    }

    pub fn is_fully_open(&self) -> bool {
        *self == Self::FULLY_OPEN
    }

    pub fn fraction(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl From<OpeningPercentage> for f64 {
    fn from(value: OpeningPercentage) -> Self {
        value.0 as f64
    }
}

impl Display for OpeningPercentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} %", self.0)
    }
}
