//! Tracing subscriber setup with optional OTLP span export.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::AppError;

const SERVICE_NAME: &str = "chronoweave-api";

/// Keeps the span exporter alive; call [`Telemetry::shutdown`] before exit
/// so buffered spans are flushed.
#[derive(Debug)]
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Flushes and stops the span exporter, if one was installed.
    pub fn shutdown(self) {
        let Some(provider) = self.provider else {
            return;
        };
        if let Err(err) = provider.shutdown() {
            tracing::warn!(%err, "failed to flush span exporter");
        }
    }
}

/// Installs the global subscriber: `RUST_LOG` filter (default `info`), JSON
/// output, and an OpenTelemetry layer when `otlp_endpoint` is set.
///
/// Must be called from within a Tokio runtime when an endpoint is given.
///
/// # Errors
///
/// Returns `AppError::Telemetry` if the exporter cannot be built or a
/// global subscriber is already installed.
pub fn init(otlp_endpoint: Option<&str>) -> Result<Telemetry, AppError> {
    let provider = otlp_endpoint.map(build_provider).transpose()?;
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .with(otel_layer)
        .try_init()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    Ok(Telemetry { provider })
}

fn build_provider(endpoint: &str) -> Result<SdkTracerProvider, AppError> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(format!("OTLP exporter: {e}")))?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}
