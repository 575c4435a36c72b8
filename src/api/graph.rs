use std::sync::Arc;

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use tokio::task;

use super::fetch_weather;
use crate::models::WeatherRequest;
use crate::models::weather::default_timezone;
use crate::web::AppState;
use crate::{ServiceError, chart};

#[derive(Debug, Deserialize)]
pub(super) struct GraphQuery {
    latitude: f64,
    longitude: f64,
    #[serde(default = "default_timezone")]
    timezone: String,
}

pub(super) async fn get_weather_graph(
    State(state): State<Arc<AppState>>,
    query: Result<Query<GraphQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Query(query) =
        query.map_err(|rejection| ServiceError::validation(rejection.body_text()))?;

    let request =
        WeatherRequest::new(query.latitude, query.longitude).with_timezone(query.timezone);
    let weather = fetch_weather(&state, &request).await?;

    let options = state.chart.clone();
    let png = task::spawn_blocking(move || chart::render_png(&weather, &options))
        .await
        .map_err(|e| ServiceError::render(format!("Chart task failed: {e}")))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}
