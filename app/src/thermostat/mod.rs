mod control;

pub use control::auto_opening;

use std::time::Duration;

use serde::Deserialize;

use crate::core::unit::{DegreeCelsius, OpeningPercentage};

#[derive(Debug, Clone, Deserialize)]
pub struct ThermostatConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_outside_temp")]
    pub outside_temp: f64,
    #[serde(default = "default_max_inside_temp")]
    pub max_inside_temp: f64,
}

fn default_tick_ms() -> u64 {
    250
}

fn default_outside_temp() -> f64 {
    12.0
}

fn default_max_inside_temp() -> f64 {
    25.0
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            outside_temp: default_outside_temp(),
            max_inside_temp: default_max_inside_temp(),
        }
    }
}

impl ThermostatConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Heat exchange through the window: relaxes toward the outside temperature while open
/// (faster the wider it is), and back toward the indoor ceiling while closed.
#[derive(Debug, Clone)]
pub struct ThermostatSimulator {
    inside: DegreeCelsius,
    outside: DegreeCelsius,
    max_inside: DegreeCelsius,
}

impl ThermostatSimulator {
    pub fn new(config: &ThermostatConfig) -> Self {
        Self {
            inside: DegreeCelsius(config.max_inside_temp),
            outside: DegreeCelsius(config.outside_temp),
            max_inside: DegreeCelsius(config.max_inside_temp),
        }
    }

    pub fn inside(&self) -> DegreeCelsius {
        self.inside
    }

    pub fn set_inside(&mut self, inside: DegreeCelsius) {
        self.inside = inside;
    }

    /// Advances one tick from the previous value, no sub-stepping.
    pub fn tick(&mut self, opening: OpeningPercentage) -> DegreeCelsius {
        self.inside = if opening.is_open() {
            self.inside - opening.fraction() * (self.inside - self.outside) / 100.0
        } else {
            self.inside + (self.max_inside - self.inside) / 200.0
        };

        self.inside
    }
}
