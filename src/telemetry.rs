//! Logging and optional OpenTelemetry export

use anyhow::{Context, Result};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{Resource, logs::SdkLoggerProvider, trace::SdkTracerProvider};
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LoggingConfig, TelemetryConfig};

/// Flushes exporters on drop; keep alive for the lifetime of the process
#[must_use]
#[derive(Default)]
pub struct TelemetryGuard {
    tracer: Option<SdkTracerProvider>,
    logger: Option<SdkLoggerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(tracer) = self.tracer.take()
            && let Err(e) = tracer.shutdown()
        {
            eprintln!("failed to shut down trace exporter: {e}");
        }
        if let Some(logger) = self.logger.take()
            && let Err(e) = logger.shutdown()
        {
            eprintln!("failed to shut down log exporter: {e}");
        }
    }
}

/// `RUST_LOG` wins over the configured level
fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(format!("{level},h2=warn,hyper_util=warn,opentelemetry=warn"))
        .with_context(|| format!("Invalid log level '{level}'"))
}

fn resource(config: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new(SERVICE_VERSION, crate::VERSION))
        .build()
}

fn otlp_providers(
    config: &TelemetryConfig,
    endpoint: &str,
) -> Result<(SdkTracerProvider, SdkLoggerProvider)> {
    let endpoint = endpoint.trim_end_matches('/');
    let spans = SpanExporter::builder()
        .with_http()
        .with_endpoint(format!("{endpoint}/v1/traces"))
        .build()
        .context("Failed to build OTLP span exporter")?;
    let logs = LogExporter::builder()
        .with_http()
        .with_endpoint(format!("{endpoint}/v1/logs"))
        .build()
        .context("Failed to build OTLP log exporter")?;

    let tracer = SdkTracerProvider::builder()
        .with_resource(resource(config))
        .with_batch_exporter(spans)
        .build();
    let logger = SdkLoggerProvider::builder()
        .with_resource(resource(config))
        .with_batch_exporter(logs)
        .build();
    Ok((tracer, logger))
}

/// Install the global subscriber
pub fn init(logging: &LoggingConfig, telemetry: &TelemetryConfig) -> Result<TelemetryGuard> {
    let filter = env_filter(&logging.level)?;
    let json = logging.format.eq_ignore_ascii_case("json");

    let mut guard = TelemetryGuard::default();
    if let Some(endpoint) = telemetry.otlp_endpoint.as_deref() {
        let (tracer, logger) = otlp_providers(telemetry, endpoint)?;
        guard.tracer = Some(tracer);
        guard.logger = Some(logger);
    }

    let otel_traces = guard.tracer.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(telemetry.service_name.clone()))
    });
    let otel_logs = guard.logger.as_ref().map(OpenTelemetryTracingBridge::new);

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().pretty()))
        .with(otel_traces)
        .with(otel_logs)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(endpoint) = &telemetry.otlp_endpoint {
        tracing::info!(endpoint, "exporting telemetry over OTLP");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("not a [level").is_err());
            assert!(env_filter("debug").is_ok());
        }
    }
}
