use crate::core::unit::{DegreeCelsius, OpeningPercentage, TargetTemperature};

/// Opening percent per degree above target.
const GAIN: f64 = 50.0;

/// Proportional law: fully closed at or below target, fully open 2 °C above it,
/// linear in between.
pub fn auto_opening(inside: DegreeCelsius, target: TargetTemperature) -> OpeningPercentage {
    let diff = inside - target.celsius();
    OpeningPercentage::from_f64(diff.0 * GAIN)
}
