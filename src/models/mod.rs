//! Data models for the weather service
//!
//! - Weather: inbound queries and the reshaped hourly answer
//! - Forecast: the upstream provider payload and the view handlers take of it

pub mod forecast;
pub mod weather;

pub use forecast::{ForecastEnvelope, HourlySource, LocationForecast, TimeRange};
pub use weather::{HourlyData, WeatherRequest, WeatherResponse};
