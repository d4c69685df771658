use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::error::Error;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub service_name: String,
    pub app_name: String,
    pub logs: EnvFilterConfig,
    pub traces: EnvFilterConfig,
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OtlpConfig {
    pub url: String,
}

impl TryInto<EnvFilter> for EnvFilterConfig {
    type Error = tracing_subscriber::filter::ParseError;

    fn try_into(self) -> Result<EnvFilter, Self::Error> {
        EnvFilter::builder()
            .with_default_directive(self.default_level.parse()?)
            .parse(self.filters.join(","))
    }
}

impl MonitoringConfig {
    /// Installs the global subscriber. Console logs are always on, spans are only exported
    /// when an OTLP endpoint is configured.
    pub fn init(&self) -> Result<(), Box<dyn Error>> {
        let logging_filter: EnvFilter = self.logs.clone().try_into()?;

        match &self.otlp {
            Some(otlp_config) => {
                opentelemetry::global::set_text_map_propagator(TraceContextPropagator::default());

                let tracer_provider = self.init_traces(&otlp_config.url)?;
                let tracer = tracer_provider.tracer(self.app_name.to_owned());
                opentelemetry::global::set_tracer_provider(tracer_provider);
                let tracing_filter: EnvFilter = self.traces.clone().try_into()?;
                let tracing_layer = OpenTelemetryLayer::new(tracer).with_filter(tracing_filter);
                let fmt_layer = tracing_subscriber::fmt::layer().with_filter(logging_filter);

                tracing_subscriber::registry()
                    .with(tracing_layer)
                    .with(fmt_layer)
                    .init();
            }
            None => {
                let fmt_layer = tracing_subscriber::fmt::layer().with_filter(logging_filter);
                tracing_subscriber::registry().with(fmt_layer).init();
            }
        }

        Ok(())
    }

    fn init_traces(&self, url: &str) -> Result<SdkTracerProvider, ExporterBuildError> {
        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
            .with_attribute(KeyValue::new("app.name", self.app_name.clone()))
            .build();

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(url)
            .build()?;

        Ok(SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build())
    }
}
