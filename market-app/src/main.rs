//! # Marketplace Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Create the marketplace service and content filter
//! - Seed the reference exchange rates into an empty ledger
//! - Start the HTTP server

mod config;

use opentelemetry::global;
use opentelemetry_sdk::{metrics::SdkMeterProvider, propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_hex::{MarketService, ServiceConfig, content_filter, inbound::HttpServer};
use market_repo::build_repo;

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("market-service"), provider))
}

/// Installs the global meter provider read by the HTTP metrics layer.
fn init_meter() -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .build()?;

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .build();

    global::set_meter_provider(provider.clone());
    Ok(provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing and metrics
    let (otel_tracer, otel_provider) = init_tracer()?;
    let meter_provider = init_meter()?;
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,market_app=debug,market_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting marketplace server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    // Create the marketplace service
    let filter = content_filter(&config.blocked_words);
    let service = MarketService::with_config(
        repo,
        filter,
        ServiceConfig {
            store_timeout: config.store_timeout,
        },
    );

    if config.seed_reference_rates {
        let today = chrono::Utc::now().date_naive();
        if service.seed_reference_rates(today).await? {
            tracing::info!("Ledger was empty, reference rates installed");
        }
    }

    // Create and run the HTTP server
    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces and metrics are flushed before exit
    let _ = meter_provider.shutdown();
    let _ = otel_provider.shutdown();
    Ok(())
}
