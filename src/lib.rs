//! `meteoproxy` - relay for Open-Meteo hourly forecasts
//!
//! This library provides the request/response model, the cached and retrying
//! upstream client, the HTTP handlers and the chart renderer of the service.

pub mod api;
pub mod cache;
pub mod chart;
pub mod config;
pub mod error;
pub mod models;
pub mod telemetry;
pub mod upstream;
pub mod web;

// Re-export core types for public API
pub use cache::ResponseCache;
pub use config::Settings;
pub use error::ServiceError;
pub use models::{HourlyData, WeatherRequest, WeatherResponse};
pub use upstream::UpstreamClient;
pub use web::{AppState, app};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
