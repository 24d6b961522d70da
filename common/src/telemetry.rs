// Telemetry module for structured logging, metrics, and tracing

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "helpdesk-analysis";

/// Initialize structured logging with JSON formatting and trace context
///
/// This function sets up the tracing subscriber with:
/// - JSON formatting for structured logs
/// - Trace context (trace_id, span_id) in all log entries
/// - Log levels from `RUST_LOG`, falling back to the configured level
/// - Optional OpenTelemetry integration
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized with JSON formatting"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(
        endpoint = endpoint,
        "OpenTelemetry tracer initialized with OTLP exporter"
    );

    Ok(tracer)
}

/// Shutdown OpenTelemetry tracer provider, flushing remaining spans
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter and describe the pipeline metrics
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "analysis_jobs_submitted_total",
        "Archives accepted by the analysis service"
    );
    describe_counter!(
        "analysis_jobs_completed_total",
        "Jobs whose result was fetched and stored"
    );
    describe_counter!(
        "analysis_jobs_failed_total",
        "Jobs marked failed by the service or the status checker"
    );
    describe_counter!(
        "analysis_tickets_ingested_total",
        "Tickets converted into reports"
    );
    describe_counter!(
        "analysis_tickets_rejected_total",
        "Tickets skipped because of validation or store errors"
    );
    describe_counter!(
        "analysis_batch_rollbacks_total",
        "Ingestion batches rolled back as a whole"
    );
    describe_gauge!("analysis_pending_jobs", "Jobs still waiting on the analysis service");
    describe_histogram!(
        "analysis_poll_duration_seconds",
        "Duration of one status poll cycle in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_job_submitted() {
    counter!("analysis_jobs_submitted_total").increment(1);
}

#[inline]
pub fn record_job_completed() {
    counter!("analysis_jobs_completed_total").increment(1);
}

#[inline]
pub fn record_job_failed(reason: &str) {
    counter!("analysis_jobs_failed_total", "reason" => reason.to_string()).increment(1);
}

/// Record the per-ticket outcome of one ingestion batch
#[inline]
pub fn record_batch_outcome(succeeded: usize, failed: usize) {
    counter!("analysis_tickets_ingested_total").increment(succeeded as u64);
    counter!("analysis_tickets_rejected_total").increment(failed as u64);
}

#[inline]
pub fn record_batch_rollback() {
    counter!("analysis_batch_rollbacks_total").increment(1);
}

#[inline]
pub fn update_pending_jobs(count: usize) {
    gauge!("analysis_pending_jobs").set(count as f64);
}

#[inline]
pub fn record_poll_duration(duration_seconds: f64) {
    histogram!("analysis_poll_duration_seconds").record(duration_seconds);
}
