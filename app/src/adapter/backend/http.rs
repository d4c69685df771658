use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use infrastructure::HttpClientConfig;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::json;

use crate::core::unit::OpeningPercentage;

use super::{ActuatorBackend, BackendConfig, ScheduledTimer, TimerId};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AngleResponse {
    angle: f64,
}

#[derive(Debug, Deserialize)]
struct TimersResponse {
    timers: Vec<ScheduledTimer>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(None, Some(config.request_timeout())).new_tracing_client()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> anyhow::Result<()> {
        let url = self.url(path);

        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Error calling {}", url))?
            .error_for_status()
            .with_context(|| format!("Backend rejected {} with {}", url, body))?;

        Ok(())
    }
}

impl ActuatorBackend for HttpBackend {
    #[tracing::instrument(skip(self))]
    async fn set_angle(&self, angle: OpeningPercentage) -> anyhow::Result<()> {
        self.post("set_angle", json!({ "angle": angle.value() })).await
    }

    async fn get_angle(&self) -> anyhow::Result<f64> {
        let url = self.url("get_angle");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Error calling {}", url))?
            .error_for_status()?;

        Ok(response
            .json::<AngleResponse>()
            .await
            .context("Error reading current angle")?
            .angle)
    }

    #[tracing::instrument(skip(self))]
    async fn set_timer(&self, time: DateTime<FixedOffset>, angle: OpeningPercentage) -> anyhow::Result<()> {
        self.post("set_timer", json!({ "time": time.to_rfc3339(), "angle": angle.value() }))
            .await
    }

    async fn get_timers(&self) -> anyhow::Result<Vec<ScheduledTimer>> {
        let url = self.url("get_timers");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Error calling {}", url))?
            .error_for_status()?;

        Ok(response
            .json::<TimersResponse>()
            .await
            .context("Error reading timer list")?
            .timers)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_timer(&self, id: &TimerId) -> anyhow::Result<()> {
        self.post("remove_timer", json!({ "id": id })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let backend = HttpBackend::new(&BackendConfig {
            url: "http://window.local:5000/".to_owned(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(backend.url("get_angle"), "http://window.local:5000/get_angle");
    }
}
