use config::{Config, ConfigError, Environment, File};
use infrastructure::{HttpServerConfig, MonitoringConfig};
use serde::Deserialize;

use crate::actuator::ActuatorSettings;
use crate::adapter::backend::BackendConfig;
use crate::thermostat::ThermostatConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub thermostat: ThermostatConfig,
    #[serde(default)]
    pub actuator: ActuatorSettings,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// JSON file holding the persisted controls. Kept in memory only when unset.
    pub path: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(Environment::default().separator("_").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn parse(toml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let settings = parse(
            r#"
            [monitoring]
            service_name = "window-control"
            app_name = "window-control"
            logs.default_level = "info"
            traces.default_level = "info"
            "#,
        )
        .unwrap();

        assert_eq!(settings.http_server.port, 8080);
        assert_eq!(settings.backend.url, "http://localhost:5000");
        assert_eq!(settings.backend.retry.max_attempts, 5);
        assert_eq!(settings.thermostat.tick_ms, 250);
        assert_eq!(settings.actuator.settle_window_ms, 2_000);
        assert_eq!(settings.store.path, None);
    }

    #[test]
    fn sections_override_defaults() {
        let settings = parse(
            r#"
            [monitoring]
            service_name = "window-control"
            app_name = "window-control"
            logs.default_level = "info"
            traces.default_level = "info"

            [backend]
            url = "http://pi.local:5000"
            angle_poll_interval_ms = 1000

            [actuator]
            travel_time_ms = 2000

            [store]
            path = "/var/lib/window-control/settings.json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.backend.url, "http://pi.local:5000");
        assert_eq!(settings.backend.angle_poll_interval_ms, 1_000);
        assert_eq!(settings.backend.timer_poll_interval_ms, 1_000);
        assert_eq!(settings.actuator.travel_time_ms, 2_000);
        assert_eq!(settings.store.path.as_deref(), Some("/var/lib/window-control/settings.json"));
    }

    #[test]
    fn monitoring_section_is_required() {
        assert!(parse("[backend]\nurl = \"http://localhost:5000\"").is_err());
    }
}
