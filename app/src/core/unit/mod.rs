mod degree_celsius;
mod opening;
mod target_temperature;

pub use degree_celsius::DegreeCelsius;
pub use opening::OpeningPercentage;
pub use target_temperature::TargetTemperature;
