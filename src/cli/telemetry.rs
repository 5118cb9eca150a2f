//! Logging and trace export.
//!
//! Spans always go to a pretty stdout layer. When an OTLP collector is
//! configured (`--otlp-endpoint`) they are also exported over gRPC, tagged
//! with the issuer so traces from several deployments can be told apart.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::time::Duration;
use tonic::{
    metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Where spans are exported. Values come pre-validated from the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpExporter {
    /// `http://` or `https://` collector URL.
    pub endpoint: String,
    /// Lowercased ASCII gRPC metadata.
    pub headers: Vec<(String, String)>,
    /// Public base URL of this deployment.
    pub issuer: String,
}

impl OtlpExporter {
    fn metadata(&self) -> Result<MetadataMap> {
        let mut meta = MetadataMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid metadata key {name}"))?;
            let value: MetadataValue<Ascii> = value
                .parse()
                .with_context(|| format!("invalid metadata value for {name}"))?;
            meta.append(key, value);
        }
        Ok(meta)
    }

    /// TLS with native roots for `https` collectors, verified against the endpoint host.
    fn tls_config(&self) -> Option<ClientTlsConfig> {
        let url = url::Url::parse(&self.endpoint).ok()?;
        if url.scheme() != "https" {
            return None;
        }
        let host = url.host_str()?;
        Some(
            ClientTlsConfig::new()
                .domain_name(host.to_string())
                .with_native_roots(),
        )
    }

    fn resource(&self, instance_id: String) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                KeyValue::new("service.instance.id", instance_id),
                KeyValue::new("vcs.revision", crate::GIT_COMMIT_HASH),
                KeyValue::new("asashio.issuer", self.issuer.clone()),
            ])
            .build()
    }
}

fn init_tracer(exporter: &OtlpExporter) -> Result<Tracer> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&exporter.endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(tls) = exporter.tls_config() {
        builder = builder.with_tls_config(tls);
    }

    if !exporter.headers.is_empty() {
        builder = builder.with_metadata(exporter.metadata()?);
    }

    let span_exporter = builder
        .build()
        .context("failed to build OTLP span exporter")?;

    let trace_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(exporter.resource(Ulid::new().to_string()))
        .build();

    // Kept for shutdown
    let _ = TRACER_PROVIDER.set(trace_provider.clone());

    global::set_tracer_provider(trace_provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(trace_provider.tracer(env!("CARGO_PKG_NAME")))
}

fn env_filter(verbosity_level: Level) -> Result<EnvFilter> {
    Ok(EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?))
}

/// Initialize logging and, when `exporter` is given, the OTLP trace exporter.
///
/// # Errors
///
/// Returns an error if tracer or subscriber initialization fails
pub fn init(verbosity_level: Option<Level>, exporter: Option<&OtlpExporter>) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = env_filter(verbosity_level)?;

    if let Some(exporter) = exporter {
        let tracer = init_tracer(exporter)?;
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let subscriber = Registry::default()
            .with(fmt_layer)
            .with(otel_layer)
            .with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
        debug!(endpoint = %exporter.endpoint, "exporting traces");
    } else {
        let subscriber = Registry::default().with(fmt_layer).with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Flush and shut down the tracer provider. Noop if tracing was never enabled.
pub fn shutdown_tracer() {
    if let Some(tp) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = tp.shutdown();
        debug!("tracer provider shutdown complete");
    }
}
