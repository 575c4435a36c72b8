//! Open-Meteo forecast payload and the narrow view the handlers use of it

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::ServiceError;

/// Spacing assumed when the provider returns a single hourly sample
pub const DEFAULT_INTERVAL_SECONDS: i64 = 3600;

/// Sampling window of an hourly series, in Unix seconds.
///
/// `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
    pub interval: i64,
}

impl TimeRange {
    /// Timestamps in `[start, end)` stepped by `interval`
    pub fn timestamps(&self) -> Result<Vec<DateTime<Utc>>, ServiceError> {
        if self.interval <= 0 {
            return Err(ServiceError::upstream(format!(
                "Invalid hourly interval: {}s",
                self.interval
            )));
        }
        let mut timestamps = Vec::new();
        let mut current = self.start;
        while current < self.end {
            let timestamp = DateTime::from_timestamp(current, 0).ok_or_else(|| {
                ServiceError::upstream(format!("Timestamp out of range: {current}"))
            })?;
            timestamps.push(timestamp);
            match current.checked_add(self.interval) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(timestamps)
    }
}

/// What the handlers need from a provider response
pub trait HourlySource {
    /// Values of the named hourly variable, `None` if the provider did not return it
    fn variable_series(&self, name: &str) -> Option<&[Option<f64>]>;

    /// Start, exclusive end and spacing of the hourly samples
    fn time_range(&self) -> Result<TimeRange, ServiceError>;
}

/// Provider answer: one object per requested location
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ForecastEnvelope {
    Many(Vec<LocationForecast>),
    One(Box<LocationForecast>),
}

impl ForecastEnvelope {
    #[must_use]
    pub fn into_locations(self) -> Vec<LocationForecast> {
        match self {
            ForecastEnvelope::Many(locations) => locations,
            ForecastEnvelope::One(location) => vec![*location],
        }
    }
}

/// Forecast for one location
#[derive(Debug, Deserialize)]
pub struct LocationForecast {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub utc_offset_seconds: i32,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub hourly: Option<HourlyBlock>,
}

/// Hourly block requested with `timeformat=unixtime`
#[derive(Debug, Deserialize)]
pub struct HourlyBlock {
    pub time: Vec<i64>,
    #[serde(flatten)]
    pub variables: HashMap<String, Vec<Option<f64>>>,
}

impl LocationForecast {
    fn hourly_block(&self) -> Result<&HourlyBlock, ServiceError> {
        self.hourly
            .as_ref()
            .ok_or_else(|| ServiceError::upstream("Upstream response has no hourly block"))
    }
}

impl HourlySource for LocationForecast {
    fn variable_series(&self, name: &str) -> Option<&[Option<f64>]> {
        self.hourly
            .as_ref()
            .and_then(|hourly| hourly.variables.get(name))
            .map(Vec::as_slice)
    }

    fn time_range(&self) -> Result<TimeRange, ServiceError> {
        let time = &self.hourly_block()?.time;

        let (Some(&start), Some(&last)) = (time.first(), time.last()) else {
            return Ok(TimeRange {
                start: 0,
                end: 0,
                interval: DEFAULT_INTERVAL_SECONDS,
            });
        };

        let interval = match time.get(1) {
            Some(&second) => second.checked_sub(start),
            None => Some(DEFAULT_INTERVAL_SECONDS),
        };
        let uneven = || ServiceError::upstream("Upstream hourly timestamps are not evenly spaced");

        let interval = interval.filter(|&i| i > 0).ok_or_else(uneven)?;
        if time
            .windows(2)
            .any(|pair| pair[1].checked_sub(pair[0]) != Some(interval))
        {
            return Err(uneven());
        }

        let end = last
            .checked_add(interval)
            .ok_or_else(|| ServiceError::upstream("Upstream hourly timestamps out of range"))?;

        Ok(TimeRange {
            start,
            end,
            interval,
        })
    }
}
