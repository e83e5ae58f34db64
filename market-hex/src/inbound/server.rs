//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use market_types::MarketRepository;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::MarketService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Marketplace API.
pub struct HttpServer<R: MarketRepository> {
    state: Arc<AppState<R>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: MarketRepository> HttpServer<R> {
    /// Creates a new HTTP server with the default rate limit.
    pub fn new(service: MarketService<R>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::default()),
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: MarketService<R>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/users", post(handlers::register_user::<R>))
            .route("/api/users/me", get(handlers::me::<R>))
            .route("/api/currencies", get(handlers::list_currencies::<R>))
            .route("/api/exchange-rates", get(handlers::exchange_rates::<R>))
            .route(
                "/api/exchange-rates/convert",
                get(handlers::convert::<R>),
            )
            .route(
                "/api/car-brands",
                get(handlers::list_brands::<R>).post(handlers::create_brand::<R>),
            )
            .route(
                "/api/car-models",
                get(handlers::list_models::<R>).post(handlers::create_model::<R>),
            )
            .route(
                "/api/ads",
                get(handlers::list_ads::<R>).post(handlers::create_ad::<R>),
            )
            .route(
                "/api/ads/{id}",
                get(handlers::get_ad::<R>)
                    .patch(handlers::update_ad::<R>)
                    .delete(handlers::deactivate_ad::<R>),
            )
            .route(
                "/api/conversations",
                get(handlers::list_conversations::<R>).post(handlers::open_conversation::<R>),
            )
            .route(
                "/api/missing-car-make-requests",
                get(handlers::list_missing_make_requests::<R>)
                    .post(handlers::request_missing_make::<R>),
            )
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
