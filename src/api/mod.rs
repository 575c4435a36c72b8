use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::web::AppState;

mod graph;
mod weather;

pub use weather::fetch_weather;

/// Prefixes every API route is mounted under
pub const API_PREFIXES: [&str; 2] = ["/api", "/api/v1"];

/// Method and path of each route relative to its prefix
pub const ROUTES: [(&str, &str); 2] = [("POST", "/weather"), ("GET", "/weather/graph")];

pub fn router() -> Router<Arc<AppState>> {
    API_PREFIXES
        .iter()
        .fold(Router::new(), |app, prefix| app.nest(prefix, weather_routes()))
}

fn weather_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/weather", post(weather::post_weather))
        .route("/weather/graph", get(graph::get_weather_graph))
}

/// Logs every registered endpoint.
pub fn log_endpoints() {
    for prefix in API_PREFIXES {
        for (method, path) in ROUTES {
            tracing::info!("Endpoint: {prefix}{path}, Methods: {method}");
        }
    }
}
