mod http;
#[cfg(test)]
pub mod fake;

pub use http::HttpBackend;

use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::core::resilience::RetryConfig;
use crate::core::unit::OpeningPercentage;

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_angle_poll_interval_ms")]
    pub angle_poll_interval_ms: u64,
    #[serde(default = "default_timer_poll_interval_ms")]
    pub timer_poll_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_url() -> String {
    "http://localhost:5000".to_owned()
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_angle_poll_interval_ms() -> u64 {
    500
}

fn default_timer_poll_interval_ms() -> u64 {
    1_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            request_timeout_ms: default_request_timeout_ms(),
            angle_poll_interval_ms: default_angle_poll_interval_ms(),
            timer_poll_interval_ms: default_timer_poll_interval_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn angle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.angle_poll_interval_ms.max(1))
    }

    pub fn timer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.timer_poll_interval_ms.max(1))
    }
}

/// Timer ids are opaque, the backend may hand out numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimerId {
    Number(i64),
    Text(String),
}

impl Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerId::Number(n) => write!(f, "{}", n),
            TimerId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TimerId {
    fn from(value: &str) -> Self {
        match value.parse::<i64>() {
            Ok(n) => TimerId::Number(n),
            Err(_) => TimerId::Text(value.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTimer {
    pub id: TimerId,
    pub time: String,
    pub display_angle: f64,
}

/// The actuator service owning the servo and the timer queue.
pub trait ActuatorBackend: Send + Sync + 'static {
    fn set_angle(&self, angle: OpeningPercentage) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn get_angle(&self) -> impl Future<Output = anyhow::Result<f64>> + Send;

    fn set_timer(
        &self,
        time: DateTime<FixedOffset>,
        angle: OpeningPercentage,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn get_timers(&self) -> impl Future<Output = anyhow::Result<Vec<ScheduledTimer>>> + Send;

    fn remove_timer(&self, id: &TimerId) -> impl Future<Output = anyhow::Result<()>> + Send;
}
