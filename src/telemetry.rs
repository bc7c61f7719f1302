use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`) and
/// human-readable output. With `MINE_OTLP_ENDPOINT` set, spans are also
/// exported over OTLP/HTTP under `service_name`.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "distributed")]
    let filter = match std::env::var("MINE_OTLP_ENDPOINT") {
        Ok(endpoint) => match init_otlp(service_name, &endpoint, filter) {
            Ok(()) => return,
            Err(filter) => filter,
        },
        Err(_) => filter,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    tracing::debug!(service = service_name, "tracing initialised");
}

/// Hands the filter back when the exporter cannot be built.
#[cfg(feature = "distributed")]
fn init_otlp(service_name: &str, endpoint: &str, filter: EnvFilter) -> Result<(), EnvFilter> {
    use opentelemetry::KeyValue;
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::{Protocol, WithExportConfig};
    use opentelemetry_sdk::{Resource, trace as sdktrace};

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("OTLP exporter unavailable, logging locally only: {}", e);
            return Err(filter);
        }
    };
    let resource = Resource::builder_empty()
        .with_attributes(vec![KeyValue::new("service.name", service_name.to_string())])
        .build();
    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = provider.tracer(service_name.to_string());
    opentelemetry::global::set_tracer_provider(provider);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    tracing::info!(endpoint, "exporting spans over OTLP");
    Ok(())
}
