use std::sync::Arc;

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use tracing::{debug, instrument};

use crate::ServiceError;
use crate::models::{ForecastEnvelope, HourlyData, HourlySource, WeatherRequest, WeatherResponse};
use crate::web::AppState;

pub(super) async fn post_weather(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WeatherRequest>, JsonRejection>,
) -> Result<Json<WeatherResponse>, ServiceError> {
    let Json(request) =
        payload.map_err(|rejection| ServiceError::validation(rejection.body_text()))?;
    let response = fetch_weather(&state, &request).await?;
    Ok(Json(response))
}

/// Validate `request`, query the provider and reshape the first location's hourly series.
#[instrument(skip(state))]
pub async fn fetch_weather(
    state: &AppState,
    request: &WeatherRequest,
) -> Result<WeatherResponse, ServiceError> {
    request.validate()?;

    let envelope: ForecastEnvelope = state
        .upstream
        .fetch(&state.forecast_url, &request.query_params())
        .await?;

    let Some(location) = envelope.into_locations().into_iter().next() else {
        return Err(ServiceError::NoData);
    };

    let values = location
        .variable_series(&request.hourly)
        .ok_or_else(|| {
            ServiceError::upstream(format!(
                "Upstream response has no hourly '{}' series",
                request.hourly
            ))
        })?
        .to_vec();
    let dates = location.time_range()?.timestamps()?;
    debug!(
        "Upstream returned {} timestamps and {} values",
        dates.len(),
        values.len()
    );

    Ok(WeatherResponse {
        latitude: location.latitude,
        longitude: location.longitude,
        elevation: location.elevation,
        timezone: location.timezone,
        timezone_abbreviation: location.timezone_abbreviation,
        utc_offset_seconds: location.utc_offset_seconds,
        hourly_data: HourlyData::aligned(request.hourly.clone(), dates, values),
    })
}
