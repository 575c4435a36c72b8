use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::api;
use crate::chart;
use crate::cache::ResponseCache;
use crate::config::{ChartConfig, Settings};
use crate::upstream::UpstreamClient;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Process-wide state shared by all handlers
pub struct AppState {
    pub upstream: UpstreamClient,
    pub forecast_url: String,
    pub chart: ChartConfig,
}

impl AppState {
    /// Open the response cache and build the upstream client
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let cache = ResponseCache::open(&settings.cache.path).with_context(|| {
            format!("Failed to open cache database at {}", settings.cache.path)
        })?;
        let upstream = UpstreamClient::new(
            &settings.upstream,
            cache,
            settings.cache.ttl(),
            settings.upstream_deadline(),
        )?;

        if !chart::register_chart_font() {
            tracing::warn!("Chart font could not be registered, graph requests will fail");
        }

        Ok(Self {
            upstream,
            forecast_url: settings.upstream.forecast_url.clone(),
            chart: settings.chart.clone(),
        })
    }

    /// Flush everything that must outlive the process
    pub fn close(&self) -> Result<()> {
        self.upstream
            .close()
            .with_context(|| "Failed to flush response cache")
    }
}

pub fn app(state: Arc<AppState>, settings: &Settings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router()
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            settings.request_timeout(),
        ))
        .layer(cors);

    if settings.logging.capture_http {
        app.layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
    } else {
        app
    }
}

pub async fn run(settings: Settings) -> Result<()> {
    let state = Arc::new(AppState::from_settings(&settings)?);
    let app = app(state.clone(), &settings);

    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Web server running at http://{}", addr);
    api::log_endpoints();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| "Server error")?;

    tracing::info!("Shutting down, flushing response cache");
    state.close()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
}
