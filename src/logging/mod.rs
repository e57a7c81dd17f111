//! Logging setup for the binary
//!
//! stderr by default, a log file in diagnostic mode, and an optional OTLP
//! exporter when built with the `otel` feature.

mod error_ext;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;

pub use error_ext::{ErrorTraceExt, ResultTraceExt};

#[cfg(feature = "otel")]
use opentelemetry::global;
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace::SdkTracerProvider;

// Kept for flushing on shutdown
#[cfg(feature = "otel")]
static OTEL_PROVIDER: std::sync::OnceLock<SdkTracerProvider> = std::sync::OnceLock::new();

/// Flush and stop the OpenTelemetry provider, if one was installed
#[cfg(feature = "otel")]
pub fn shutdown_otel() {
    if let Some(provider) = OTEL_PROVIDER.get() {
        tracing::info!("Shutting down OpenTelemetry provider...");
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shutdown OpenTelemetry provider: {:?}", e);
        } else {
            tracing::info!("OpenTelemetry provider shutdown complete");
        }
    }
}

/// No-op without the `otel` feature
#[cfg(not(feature = "otel"))]
pub fn shutdown_otel() {}

#[cfg(feature = "otel")]
fn init_otel(endpoint: &str, service_name: &str) -> anyhow::Result<SdkTracerProvider> {
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();

    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

/// Build an EnvFilter from RUST_LOG, falling back to the CLI verbosity
///
/// Priority: RUST_LOG environment variable > CLI arguments (-v, -vv, -q)
pub fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return tracing_subscriber::EnvFilter::new(rust_log);
        }
    }
    tracing_subscriber::EnvFilter::new(cli.log_level().as_str().to_ascii_lowercase())
}

/// Install the global subscriber with `fmt_layer` plus the optional OTLP layer
fn install<L>(cli: &Cli, fmt_layer: L) -> anyhow::Result<()>
where
    L: tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    let filter = build_env_filter(cli);
    let registry = tracing_subscriber::registry().with(fmt_layer);

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = cli.otel_endpoint.as_deref().filter(|_| cli.is_otel_enabled()) {
            let service_name = &cli.otel_service_name;
            eprintln!("OpenTelemetry enabled: endpoint={endpoint}, service={service_name}");

            let provider = init_otel(endpoint, service_name)?;
            let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
            drop(OTEL_PROVIDER.set(provider));

            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .with(filter)
                .try_init()?;
            return Ok(());
        }
    }

    registry.with(filter).try_init()?;
    Ok(())
}

/// Initialize logging based on CLI arguments
pub fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    if !cli.is_diagnostic() {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false);
        return install(cli, fmt_layer);
    }

    let log_path = cli.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(&log_path)?;
    eprintln!("Diagnostic mode: logging to {}", log_path.display());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false);
    install(cli, fmt_layer)
}
