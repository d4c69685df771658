use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{self, HeaderMap};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_tracing::TracingMiddleware;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default)]
    bearer_token: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl HttpClientConfig {
    pub fn new(bearer_token: Option<String>, timeout: Option<Duration>) -> Self {
        Self {
            bearer_token,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        }
    }

    pub fn new_tracing_client(&self) -> anyhow::Result<ClientWithMiddleware> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &self.bearer_token {
            let mut auth_value = header::HeaderValue::from_str(format!("Bearer {}", token).as_str())
                .context("Bearer token is not a valid header value")?;
            auth_value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout_ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        Ok(reqwest_middleware::ClientBuilder::new(builder.build()?)
            .with(TracingMiddleware::default())
            .build())
    }
}
